use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Final lifecycle of one duplex in a conversation.
#[derive(Debug, Serialize)]
pub struct PeerReport {
    pub label: String,
    pub policy: &'static str,
    pub state: &'static str,
    pub reason: Option<String>,
    pub input: String,
    pub output: String,
    pub received: Vec<String>,
    pub closes: usize,
    pub errors: usize,
}

#[derive(Serialize)]
struct ConversationOutput<'a> {
    schema_id: &'a str,
    peers: &'a [PeerReport],
}

pub fn print_conversation(peers: &[PeerReport], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ConversationOutput {
                schema_id: "plexes/cli/v1/conversation.json",
                peers,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "DUPLEX", "POLICY", "STATE", "INPUT", "OUTPUT", "RECEIVED", "CLOSE", "ERROR",
                ]);
            for peer in peers {
                table.add_row(vec![
                    peer.label.clone(),
                    peer.policy.to_string(),
                    state_cell(peer),
                    peer.input.clone(),
                    peer.output.clone(),
                    peer.received.join(", "),
                    peer.closes.to_string(),
                    peer.errors.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for peer in peers {
                println!(
                    "{} [{}] {} input={} output={} received={:?} close={} error={}",
                    peer.label,
                    peer.policy,
                    state_cell(peer),
                    peer.input,
                    peer.output,
                    peer.received,
                    peer.closes,
                    peer.errors
                );
            }
        }
    }
}

fn state_cell(peer: &PeerReport) -> String {
    match &peer.reason {
        Some(reason) => format!("{} ({reason})", peer.state),
        None => peer.state.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(reason: Option<&str>) -> PeerReport {
        PeerReport {
            label: "a".to_string(),
            policy: "half-duplex",
            state: if reason.is_some() { "errored" } else { "closed" },
            reason: reason.map(str::to_string),
            input: "closed".to_string(),
            output: "closed".to_string(),
            received: vec!["hello!".to_string()],
            closes: 1,
            errors: 0,
        }
    }

    #[test]
    fn state_cell_carries_reason() {
        assert_eq!(state_cell(&sample(None)), "closed");
        assert_eq!(state_cell(&sample(Some("boom"))), "errored (boom)");
    }

    #[test]
    fn json_report_lists_peers() {
        let peers = [sample(None)];
        let out = ConversationOutput {
            schema_id: "plexes/cli/v1/conversation.json",
            peers: &peers,
        };
        let value = serde_json::to_value(&out).expect("report should serialize");
        assert_eq!(value["peers"][0]["label"], "a");
        assert_eq!(value["peers"][0]["received"][0], "hello!");
        assert!(value["peers"][0]["reason"].is_null());
    }
}
