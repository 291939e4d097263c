//! Built-in plan for the `WBP_LocalMatchDebug` widget: six debug buttons driving the local
//! match subsystem, plus lifecycle delegate logging.

use serde_json::{Value, json};

use crate::plan::{
  ChainSpec, DataLink, DelegateSpec, LifecycleSpec, PersistStrategy, RebuildPlan, StepSpec,
  TriggerSpec,
};
use crate::types::{Params, Position};

pub const GRAPH_NAME: &str = "WBP_LocalMatchDebug";

const SUBSYSTEM_CLASS: &str = "/Script/StupidChessCoreBridge.StupidChessLocalMatchSubsystem";
const SUBSYSTEM: &str = "UStupidChessLocalMatchSubsystem";
const MOVE_COMMAND_STRUCT: &str = "/Script/StupidChessCoreBridge.StupidChessMoveCommand";

const MATCH_ID: &str = "900";
const RED_PLAYER_ID: &str = "10001";
const BLACK_PLAYER_ID: &str = "10002";
const AFTER_SERVER_SEQUENCE: &str = "0";

const TRIGGER_X: i64 = -2800;
const ACCESSOR_X: i64 = -2300;

const DELEGATES: [&str; 6] = [
  "OnJoinAckParsed",
  "OnCommandAckParsed",
  "OnErrorParsed",
  "OnSnapshotParsed",
  "OnEventDeltaParsed",
  "OnGameOverParsed",
];

fn params(v: Value) -> Params {
  match v {
    Value::Object(m) => m,
    _ => Params::new(),
  }
}

fn accessor(y: i64) -> StepSpec {
  StepSpec::accessor("subsystem", SUBSYSTEM_CLASS, Position::new(ACCESSOR_X, y))
}

fn subsystem_call(name: &str, function: &str, x: i64, y: i64, p: Value) -> StepSpec {
  StepSpec::call(name, SUBSYSTEM, function, Position::new(x, y), params(p)).on_subsystem()
}

fn pull(name: &str, player_id: &str, x: i64, y: i64) -> StepSpec {
  subsystem_call(
    name,
    "PullParseAndDispatchOutboundMessages",
    x,
    y,
    json!({"PlayerId": player_id, "AfterServerSequence": AFTER_SERVER_SEQUENCE}),
  )
}

fn join_chain() -> ChainSpec {
  let y = -900;
  ChainSpec {
    trigger: "BtnJoin".to_string(),
    steps: vec![
      accessor(y),
      subsystem_call("reset", "ResetLocalServer", -1850, y, json!({})),
      subsystem_call(
        "join_red",
        "JoinLocalMatch",
        -1450,
        y,
        json!({"MatchId": MATCH_ID, "PlayerId": RED_PLAYER_ID}),
      ),
      subsystem_call(
        "join_black",
        "JoinLocalMatch",
        -1050,
        y,
        json!({"MatchId": MATCH_ID, "PlayerId": BLACK_PLAYER_ID}),
      ),
      pull("pull_red", RED_PLAYER_ID, -650, y),
      pull("pull_black", BLACK_PLAYER_ID, -250, y),
    ],
    data_links: vec![],
  }
}

fn commit_reveal_chain() -> ChainSpec {
  let y = -300;
  let commit = |name: &str, player: &str, side: &str, x: i64| {
    subsystem_call(
      name,
      "SubmitCommitSetup",
      x,
      y,
      json!({"MatchId": MATCH_ID, "PlayerId": player, "Side": side, "HashHex": ""}),
    )
  };
  let reveal = |name: &str, player: &str, side: &str, nonce: &str, x: i64| {
    subsystem_call(
      name,
      "SubmitRevealSetup",
      x,
      y,
      json!({"MatchId": MATCH_ID, "PlayerId": player, "Side": side, "Nonce": nonce}),
    )
  };
  let placements = |name: &str, side: &str, x: i64, y: i64| {
    subsystem_call(name, "BuildStandardSetupPlacements", x, y, json!({"Side": side})).data_only()
  };
  ChainSpec {
    trigger: "BtnCommitReveal".to_string(),
    steps: vec![
      accessor(y),
      commit("commit_red", RED_PLAYER_ID, "Red", -1850),
      commit("commit_black", BLACK_PLAYER_ID, "Black", -1450),
      placements("placements_red", "Red", -1850, -120),
      reveal("reveal_red", RED_PLAYER_ID, "Red", "R", -1050),
      placements("placements_black", "Black", -1450, 60),
      reveal("reveal_black", BLACK_PLAYER_ID, "Black", "B", -650),
      pull("pull_red", RED_PLAYER_ID, -250, y),
      pull("pull_black", BLACK_PLAYER_ID, 150, y),
    ],
    data_links: vec![
      DataLink::new("placements_red", "reveal_red", "Placements"),
      DataLink::new("placements_black", "reveal_black", "Placements"),
    ],
  }
}

fn red_move_chain() -> ChainSpec {
  let y = 300;
  ChainSpec {
    trigger: "BtnRedMove".to_string(),
    steps: vec![
      accessor(y),
      StepSpec::struct_literal(
        "move_command",
        MOVE_COMMAND_STRUCT,
        Position::new(-1850, y + 180),
        params(json!({
          "PieceId": 0,
          "FromX": 0,
          "FromY": 3,
          "ToX": 0,
          "ToY": 4,
          "bHasCapturedPieceId": false,
          "CapturedPieceId": 0,
        })),
      ),
      subsystem_call(
        "submit_move",
        "SubmitMove",
        -1850,
        y,
        json!({"MatchId": MATCH_ID, "PlayerId": RED_PLAYER_ID, "Side": "Red"}),
      ),
      pull("pull_red", RED_PLAYER_ID, -1450, y),
      pull("pull_black", BLACK_PLAYER_ID, -1050, y),
    ],
    data_links: vec![DataLink::new("move_command", "submit_move", "Move")],
  }
}

fn black_resign_chain() -> ChainSpec {
  let y = 900;
  ChainSpec {
    trigger: "BtnBlackResign".to_string(),
    steps: vec![
      accessor(y),
      subsystem_call(
        "resign_black",
        "SubmitResign",
        -1850,
        y,
        json!({"MatchId": MATCH_ID, "PlayerId": BLACK_PLAYER_ID, "Side": "Black"}),
      ),
      pull("pull_red", RED_PLAYER_ID, -1450, y),
      pull("pull_black", BLACK_PLAYER_ID, -1050, y),
    ],
    data_links: vec![],
  }
}

fn pull_chain(trigger: &str, player_id: &str, y: i64) -> ChainSpec {
  ChainSpec {
    trigger: trigger.to_string(),
    steps: vec![accessor(y), pull("pull", player_id, -1850, y)],
    data_links: vec![],
  }
}

fn lifecycle() -> LifecycleSpec {
  let y = 2400;
  LifecycleSpec {
    anchor: TriggerSpec {
      name: "Self".to_string(),
      event: "OnInitialized".to_string(),
      handler: "OnLocalMatchDebugInitialized".to_string(),
      position: Position::new(TRIGGER_X, y),
    },
    subsystem_type: SUBSYSTEM_CLASS.to_string(),
    accessor_position: Position::new(ACCESSOR_X, y),
    delegates: DELEGATES
      .iter()
      .enumerate()
      .map(|(i, name)| {
        let x = -1850 + 400 * i as i64;
        DelegateSpec {
          name: name.to_string(),
          position: Position::new(x, y),
          log_position: Position::new(x, y + 300),
          log_message: format!("{} fired", name),
        }
      })
      .collect(),
  }
}

/// The six-button local match debug plan.
pub fn local_match_debug_plan() -> RebuildPlan {
  let triggers = [
    ("BtnJoin", -900),
    ("BtnCommitReveal", -300),
    ("BtnRedMove", 300),
    ("BtnBlackResign", 900),
    ("BtnPullRed", 1500),
    ("BtnPullBlack", 1900),
  ]
  .iter()
  .map(|&(name, y)| TriggerSpec::clicked(name, Position::new(TRIGGER_X, y)))
  .collect();

  RebuildPlan {
    graph_name: GRAPH_NAME.to_string(),
    triggers,
    lifecycle: Some(lifecycle()),
    chains: vec![
      join_chain(),
      commit_reveal_chain(),
      red_move_chain(),
      black_resign_chain(),
      pull_chain("BtnPullRed", RED_PLAYER_ID, 1500),
      pull_chain("BtnPullBlack", BLACK_PLAYER_ID, 1900),
    ],
    persist: Some(PersistStrategy::RebindTrigger {
      trigger: "BtnJoin".to_string(),
    }),
  }
}
