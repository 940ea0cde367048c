// This is the entry point for the node binary
use clap::Parser;
use gossip_ledger::{
    ed25519_public_key, new_private_key, send_message, BlockchainError, Command, Config, Message,
    Node, Opt, PeerAddress, Transaction,
};
use log::{error, LevelFilter};
use std::process;

fn main() {
    // Info by default; RUST_LOG still wins when set
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    match opt.command {
        // Key generation is local only; nothing here touches the network
        Command::Createwallet => {
            let private_key = new_private_key();
            let public_key = ed25519_public_key(&private_key)?;
            println!("[wallet]");
            println!("private_key = \"{private_key}\"");
            println!("public_key = \"{public_key}\"");
        }
        Command::Send { to, amount, peer } => {
            let config = Config::load(opt.config.as_deref())?;
            let wallet = config.wallet.clone().ok_or_else(|| {
                BlockchainError::Config("send needs a [wallet] section in the config".to_string())
            })?;

            // The configured public key must belong to the private key
            if ed25519_public_key(&wallet.private_key)? != wallet.public_key.to_lowercase() {
                return Err(BlockchainError::Config(
                    "wallet public_key does not match private_key".to_string(),
                )
                .into());
            }

            let peer: PeerAddress = peer.parse()?;
            let tx = Transaction::sign(&wallet.private_key, &wallet.public_key, &to, amount)?;
            let message = Message::transaction(config.external_address(), tx);
            send_message(&peer, &message, config.timeouts())?;
            println!("Success!")
        }
        Command::StartNode { miner, port, peers } => {
            let mut config = Config::load(opt.config.as_deref())?;
            if miner {
                config.mining = true;
            }
            if let Some(port) = port {
                config.port = port;
            }
            for peer in peers {
                // Parse early so a typo fails before the node starts
                peer.parse::<PeerAddress>()?;
                config.bootstrap_peers.push(peer);
            }

            let node = Node::new(config)?;
            node.run()?;
        }
    }
    Ok(())
}
