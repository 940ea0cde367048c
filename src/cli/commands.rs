use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gossip-ledger")]
pub struct Opt {
    #[arg(long = "config", global = true, help = "Path to a TOML config file")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createwallet", about = "Print a new signing keypair")]
    Createwallet,
    #[command(name = "send", about = "Sign a transaction and send it to a peer")]
    Send {
        #[arg(help = "Receiver public key (hex)")]
        to: String,
        #[arg(help = "Amount to send")]
        amount: u64,
        #[arg(long = "peer", help = "Peer to hand the transaction to (ip:port)")]
        peer: String,
    },
    #[command(name = "startnode", about = "Start a node")]
    StartNode {
        #[arg(long = "miner", help = "Enable mining on this node")]
        miner: bool,
        #[arg(long = "port", help = "Port to listen on")]
        port: Option<u16>,
        #[arg(long = "peer", help = "Bootstrap peer to dial at startup (ip:port)")]
        peers: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_startnode() {
        let opt = Opt::parse_from([
            "gossip-ledger",
            "startnode",
            "--miner",
            "--port",
            "2001",
            "--peer",
            "127.0.0.1:1101",
            "--peer",
            "127.0.0.1:1102",
        ]);
        match opt.command {
            Command::StartNode { miner, port, peers } => {
                assert!(miner);
                assert_eq!(port, Some(2001));
                assert_eq!(peers, vec!["127.0.0.1:1101", "127.0.0.1:1102"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_send_with_config() {
        let opt = Opt::parse_from([
            "gossip-ledger",
            "send",
            "abcd",
            "5",
            "--peer",
            "10.0.0.1:1101",
            "--config",
            "node.toml",
        ]);
        assert_eq!(opt.config, Some(PathBuf::from("node.toml")));
        assert!(matches!(opt.command, Command::Send { amount: 5, .. }));
    }
}
