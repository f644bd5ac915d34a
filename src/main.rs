//! Demo driver: an all-AI match played to a winner through the public
//! facade, pacing every AI turn off the handoff flag the way a UI host
//! would.

use coup_engine::{Engine, HeuristicOracle, VerbosityLevel};

#[tokio::main]
async fn main() {
    let mut engine = Engine::new(HeuristicOracle);
    engine.set_verbosity(VerbosityLevel::Normal);

    let mut state = engine.initialize_game(&[], 4).await;

    let mut triggers = 0usize;
    while state.winner.is_none() && triggers < 1000 {
        if !state.needs_human_trigger_for_ai {
            break;
        }
        state = engine.handle_ai_action(&state).await;
        triggers += 1;
    }

    println!("--- action log ---");
    for entry in &state.action_log {
        println!("{entry}");
    }
    match state.winner {
        Some(winner) => println!("winner: {}", state.player_name(winner)),
        None => println!("no winner after {triggers} triggers"),
    }
}
