//! Scripted TCP stand-in for the editor's command endpoint.
//!
//! Serves one command per connection on its own thread and runtime, so both async library
//! tests and blocking CLI tests can talk to it. Every response is written in two chunks.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use graph_rewire::transport::ResponseBuffer;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub struct StubHost {
  pub port: u16,
  log: Arc<Mutex<Vec<Value>>>,
}

impl StubHost {
  /// Answers every command with success, except `fail_on` which gets an error status.
  pub fn start(fail_on: Option<&str>) -> Self {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind stub host");
    let port = listener.local_addr().expect("stub addr").port();
    listener.set_nonblocking(true).expect("nonblocking");
    let log = Arc::new(Mutex::new(vec![]));
    let thread_log = log.clone();
    let fail_on = fail_on.map(String::from);
    std::thread::spawn(move || {
      let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("stub runtime");
      rt.block_on(serve(listener, thread_log, fail_on));
    });
    Self { port, log }
  }

  pub fn requests(&self) -> Vec<Value> {
    self.log.lock().unwrap().clone()
  }

  pub fn command_types(&self) -> Vec<String> {
    self
      .requests()
      .iter()
      .map(|r| r["type"].as_str().unwrap_or_default().to_string())
      .collect()
  }
}

async fn serve(listener: std::net::TcpListener, log: Arc<Mutex<Vec<Value>>>, fail_on: Option<String>) {
  let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
  let mut served = 0u64;
  loop {
    let Ok((mut socket, _)) = listener.accept().await else {
      return;
    };
    let mut buffer = ResponseBuffer::new();
    let mut chunk = [0u8; 4096];
    let request = loop {
      match socket.read(&mut chunk).await {
        Ok(0) | Err(_) => break None,
        Ok(n) => {
          if let Some(v) = buffer.push(&chunk[..n]) {
            break Some(v);
          }
        }
      }
    };
    let Some(request) = request else {
      continue;
    };
    log.lock().unwrap().push(request.clone());
    served += 1;

    let bytes = serde_json::to_vec(&respond(&request, served, fail_on.as_deref())).unwrap();
    let (head, tail) = bytes.split_at(bytes.len() / 2);
    let _ = socket.write_all(head).await;
    let _ = socket.flush().await;
    tokio::time::sleep(Duration::from_millis(2)).await;
    let _ = socket.write_all(tail).await;
  }
}

fn respond(request: &Value, n: u64, fail_on: Option<&str>) -> Value {
  let kind = request["type"].as_str().unwrap_or_default();
  let params = &request["params"];
  if Some(kind) == fail_on {
    return json!({"status": "error", "error": format!("{} rejected by stub", kind)});
  }
  let result = match kind {
    "dedupe_widget_event_nodes" => json!({
      "kept_node_id": params["keep_node_id"],
      "removed_event_count": 0,
      "removed_chain_node_count": 0,
    }),
    "bind_blueprint_multicast_delegate" => json!({
      "assign_node_id": format!("A{}", n),
      "custom_event_node_id": format!("C{}", n),
    }),
    "add_blueprint_make_struct_node" => json!({"node_id": format!("N{}", n), "output_pin": "Result"}),
    "clear_blueprint_event_exec_chain" => json!({"removed_node_count": 0}),
    "compile_blueprint" => json!({"compiled": true}),
    _ => json!({"node_id": format!("N{}", n)}),
  };
  json!({"status": "success", "result": result})
}
