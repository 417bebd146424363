// =============================================================================
// Signal Engine — Command Dispatcher
// =============================================================================
//
// Reads one command per line from stdin and writes replies to stdout. This is
// the seam a chat transport would sit behind:
//
//   /signal <asset> <window.json>   evaluate a candle window
//   /won <id> | /lost <id>          report the outcome of a signal
//   /weights                        current indicator weights
//   /pending                        signals awaiting a report
//   /help
//
// State (weights + ledger) is saved after every accepted report and on exit.
// =============================================================================

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use signal_engine::config::EngineConfig;
use signal_engine::engine::{format_signal_message, Engine};
use signal_engine::logging::init_logging;
use signal_engine::market_data::Window;
use signal_engine::persistence::EngineSnapshot;

const CONFIG_ENV: &str = "SIGNAL_ENGINE_CONFIG";
const STATE_ENV: &str = "SIGNAL_ENGINE_STATE";
const DEFAULT_CONFIG_PATH: &str = "signal_engine.json";

const HELP: &str = "\
Commands:
  /signal <asset> <window.json>  evaluate a candle window
  /won <id>                      report a winning signal
  /lost <id>                     report a losing signal
  /weights                       show indicator weights
  /pending                       list signals awaiting a report
  /help                          this message";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();
    init_logging();

    info!("Signal Engine starting up");

    let config_path =
        std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = EngineConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, path = %config_path, "Failed to load config, using defaults");
        EngineConfig::default()
    });

    // First run: leave an editable copy of the defaults behind.
    if !Path::new(&config_path).exists() {
        if let Err(e) = config.save(&config_path) {
            warn!(error = %e, path = %config_path, "Failed to write default config");
        }
    }

    if let Ok(path) = std::env::var(STATE_ENV) {
        if !path.trim().is_empty() {
            config.state_path = Some(path.trim().to_string());
        }
    }
    let state_path = config.state_path.clone().map(PathBuf::from);

    // ── 2. Engine & saved state ──────────────────────────────────────────
    let engine = Engine::new(config);

    if let Some(path) = &state_path {
        match EngineSnapshot::load(path) {
            Ok(Some(snapshot)) => {
                if let Err(e) = engine.restore(snapshot) {
                    warn!(error = %e, "Failed to restore engine state, continuing with what was loaded");
                }
            }
            Ok(None) => info!(path = %path.display(), "No saved state, starting fresh"),
            Err(e) => warn!(error = %e, "Failed to load engine state, starting fresh"),
        }
    }

    // ── 3. Command loop ──────────────────────────────────────────────────
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(reply) = dispatch(&engine, state_path.as_deref(), &line).await {
                        println!("{reply}");
                    }
                }
                Ok(None) => {
                    info!("stdin closed");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Failed to read command");
                    break;
                }
            }
        }
    }

    // ── 4. Shutdown ──────────────────────────────────────────────────────
    save_state(&engine, state_path.as_deref());
    info!("Signal Engine stopped");
    Ok(())
}

// =============================================================================
// Commands
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Signal { asset: String, window_path: PathBuf },
    Feedback { id: String, won: bool },
    Weights,
    Pending,
    Help,
    Empty,
}

/// Parse one input line. `Err` carries the reply to send back.
fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let Some(head) = parts.next() else {
        return Ok(Command::Empty);
    };

    match head {
        "/signal" => match (parts.next(), parts.next()) {
            (Some(asset), Some(path)) => Ok(Command::Signal {
                asset: asset.to_string(),
                window_path: PathBuf::from(path),
            }),
            _ => Err("Usage: /signal <asset> <window.json>".to_string()),
        },
        "/won" | "/lost" => match parts.next() {
            Some(id) => Ok(Command::Feedback {
                id: id.to_string(),
                won: head == "/won",
            }),
            None => Err(format!("Please provide a signal ID (e.g., {head} <id>)")),
        },
        "/weights" => Ok(Command::Weights),
        "/pending" => Ok(Command::Pending),
        "/help" | "/start" => Ok(Command::Help),
        other => Err(format!("Unknown command {other}. Send /help for the list.")),
    }
}

async fn dispatch(engine: &Engine, state_path: Option<&Path>, line: &str) -> Option<String> {
    let command = match parse_command(line) {
        Ok(Command::Empty) => return None,
        Ok(command) => command,
        Err(reply) => return Some(reply),
    };

    let reply = match command {
        Command::Signal { asset, window_path } => {
            let window = match Window::from_json_file(&window_path) {
                Ok(w) => w,
                Err(e) => return Some(format!("Could not read window: {e:#}")),
            };
            let price = window.last_close();
            match engine.process_market_data(&asset, window).await {
                Ok(Some(signal)) => format_signal_message(&signal, price),
                Ok(None) => format!("No signal for {asset}."),
                Err(e) => format!("Signal failed: {e}"),
            }
        }
        Command::Feedback { id, won } => match engine.process_feedback(&id, won) {
            Ok(_) => {
                save_state(engine, state_path);
                format!("Feedback recorded: {} for {id}", if won { "win" } else { "loss" })
            }
            Err(e) => format!("Feedback rejected: {e}"),
        },
        Command::Weights => render_weights(engine),
        Command::Pending => render_pending(engine),
        Command::Help | Command::Empty => HELP.to_string(),
    };
    Some(reply)
}

fn render_weights(engine: &Engine) -> String {
    let min_windows = engine.registry().min_windows();
    let mut out = format!(
        "Indicator weights (emission threshold {:.0}%):",
        engine.emission_threshold() * 100.0
    );
    for r in engine.weights().snapshot() {
        out.push_str(&format!(
            "\n  {}: {:.3} ({}W/{}L, est. win rate {:.0}%)",
            r.indicator_id,
            r.weight,
            r.wins,
            r.losses,
            r.estimated_win_rate() * 100.0
        ));
        if let Some(min) = min_windows.get(&r.indicator_id) {
            out.push_str(&format!(", needs {min} candles"));
        }
    }
    out
}

fn render_pending(engine: &Engine) -> String {
    let stats = engine.ledger().stats();
    let mut out = format!(
        "Signals: {} pending, {} won, {} lost",
        stats.pending, stats.won, stats.lost
    );
    if let Some(rate) = stats.win_rate() {
        out.push_str(&format!(" (win rate {:.0}%)", rate * 100.0));
    }
    for s in engine.ledger().pending() {
        out.push_str(&format!(
            "\n  {} {} {} {:.0}% {}",
            s.id,
            s.asset,
            s.action,
            s.confidence_pct(),
            s.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    out
}

fn save_state(engine: &Engine, state_path: Option<&Path>) {
    let Some(path) = state_path else {
        return;
    };
    if let Err(e) = engine.snapshot().save(path) {
        error!(error = %e, path = %path.display(), "Failed to save engine state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_signal_command() {
        assert_eq!(
            parse_command("/signal BTC/USD data/btc.json"),
            Ok(Command::Signal {
                asset: "BTC/USD".into(),
                window_path: PathBuf::from("data/btc.json"),
            })
        );
        assert!(parse_command("/signal BTC/USD").is_err());
    }

    #[test]
    fn parses_feedback_commands() {
        assert_eq!(
            parse_command("/won abc123"),
            Ok(Command::Feedback { id: "abc123".into(), won: true })
        );
        assert_eq!(
            parse_command("  /lost   abc123 "),
            Ok(Command::Feedback { id: "abc123".into(), won: false })
        );
        assert_eq!(
            parse_command("/won"),
            Err("Please provide a signal ID (e.g., /won <id>)".to_string())
        );
    }

    #[test]
    fn blank_and_unknown_lines() {
        assert_eq!(parse_command("   "), Ok(Command::Empty));
        assert!(parse_command("/moon").is_err());
        assert_eq!(parse_command("/weights"), Ok(Command::Weights));
    }

    #[tokio::test]
    async fn unknown_feedback_is_rejected() {
        let engine = Engine::new(EngineConfig::default());
        let reply = dispatch(&engine, None, "/won deadbeef").await.unwrap();
        assert!(reply.starts_with("Feedback rejected"));
        assert!(reply.contains("deadbeef"));
    }

    #[tokio::test]
    async fn weights_lists_every_indicator() {
        let engine = Engine::new(EngineConfig::default());
        let reply = dispatch(&engine, None, "/weights").await.unwrap();
        assert!(reply.contains("emission threshold 70%"));
        for id in ["bollinger", "ema_trend", "rsi"] {
            assert!(reply.contains(&format!("{id}: 1.000")));
        }
        assert!(reply.contains("bollinger: 1.000 (0W/0L, est. win rate 50%), needs 20 candles"));
    }
}
