use anyhow::{anyhow, Result};
use clap::{ArgAction, Parser, Subcommand};
use ethers::{
    core::rand::{thread_rng, Rng},
    providers::{Provider, Ws},
    signers::{LocalWallet, Signer},
    types::{Address, U256},
};
use sc_battleship_driver::{
    sim::{run_match, MatchSetup},
    BattleshipContract, EthersBattleship, DEFAULT_STATE_NONCE,
};
use sc_battleship_game::board::{row_major, Board, DEFAULT_BOARD_SIZE, DEFAULT_SHIP_SIZES};
use std::{sync::Arc, time::Duration};
use tracing::Level;

/// Arguments for the `sc-battleship` binary.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Verbosity level (0-4)
    #[arg(long, short, help = "Verbosity level (0-4)", action = ArgAction::Count, env = "VERBOSITY")]
    v: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plays a full match between two local players over the simulated backend and prints the
    /// report as JSON.
    Simulate {
        /// The side length of both boards.
        #[arg(long, default_value_t = DEFAULT_BOARD_SIZE, env = "SC_BATTLESHIP_BOARD_SIZE")]
        board_size: u8,

        /// Seconds to wait for the match to finish.
        #[arg(long, default_value_t = 60, env = "SC_BATTLESHIP_TIMEOUT")]
        timeout: u64,
    },
    /// Reads the channel-relevant state of a deployed battleship contract.
    Inspect {
        /// The Websocket RPC endpoint used to read the contract.
        #[arg(
            long,
            short,
            help = "The Websocket RPC endpoint used to read the contract.",
            env = "SC_BATTLESHIP_WS"
        )]
        ws_endpoint: String,

        /// The address of the battleship contract.
        #[arg(
            long,
            short,
            help = "The address of the battleship contract.",
            env = "SC_BATTLESHIP_ADDRESS"
        )]
        battleship: Address,

        /// The nonce passed to `getState`.
        #[arg(long, default_value_t = DEFAULT_STATE_NONCE)]
        nonce: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse the command arguments
    let Args { v, command } = Args::parse();

    // Initialize the tracing subscriber
    init_tracing_subscriber(v)?;

    match command {
        Command::Simulate {
            board_size,
            timeout,
        } => simulate(board_size, Duration::from_secs(timeout)).await,
        Command::Inspect {
            ws_endpoint,
            battleship,
            nonce,
        } => inspect(ws_endpoint, battleship, nonce).await,
    }
}

/// Plays a match between two fresh wallets with randomly salted, stacked fleets.
async fn simulate(board_size: u8, timeout: Duration) -> Result<()> {
    let mut rng = thread_rng();
    let alice = LocalWallet::new(&mut rng);
    let bob = LocalWallet::new(&mut rng);
    tracing::info!(target: "sc-battleship-cli", "Simulating {:?} vs {:?} on a {}x{} board", alice.address(), bob.address(), board_size, board_size);

    let mut fleet = || -> Result<Board> {
        let salts = DEFAULT_SHIP_SIZES
            .iter()
            .map(|_| U256::from(rng.gen::<u64>()))
            .collect::<Vec<_>>();
        Board::stacked(board_size, &DEFAULT_SHIP_SIZES, &salts)
    };
    let (alice_board, bob_board) = (fleet()?, fleet()?);

    let report = run_match(MatchSetup {
        alice,
        bob,
        alice_board,
        bob_board,
        alice_targets: row_major(board_size).collect(),
        bob_targets: row_major(board_size).collect(),
        timeout,
    })
    .await?;
    tracing::info!(target: "sc-battleship-cli", "Match won by {:?}", report.winner);

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Prints the counters and state hash of a deployed battleship contract.
async fn inspect(ws_endpoint: String, battleship: Address, nonce: u64) -> Result<()> {
    tracing::debug!(target: "sc-battleship-cli", "Connecting to websocket endpoint...");
    let provider = Provider::<Ws>::connect(ws_endpoint.clone()).await?;
    tracing::info!(target: "sc-battleship-cli", "Websocket connected @ {}", ws_endpoint);

    let contract = EthersBattleship::new(battleship, Arc::new(provider));
    let state = serde_json::json!({
        "address": contract.address(),
        "move_ctr": contract.move_ctr().await?,
        "round": contract.round().await?,
        "channel_counter": contract.channel_counter().await?,
        "state_channel": contract.state_channel().await?,
        "state": contract.get_state(U256::from(nonce)).await?,
    });

    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Initializes the tracing subscriber
///
/// # Arguments
/// * `verbosity_level` - The verbosity level (0-4)
///
/// # Returns
/// * `Result<()>` - Ok if successful, Err otherwise.
fn init_tracing_subscriber(verbosity_level: u8) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(match verbosity_level {
            0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            3 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}
