//! The `sim` module runs the protocol without a chain. [SimBattleship] is an in-memory battleship
//! contract that enforces what the deployed contract enforces: move signatures, turn order, ship
//! commitments, the lock and unlock handshakes and the state hash. [Session] steps two players
//! against it deterministically; [run_match] plays a full game with both players on their own
//! [PlayerDriver] tasks.

use crate::{
    contract::{BattleshipContract, ContractDeployer, Receipt},
    drivers::PlayerDriver,
    errors::ProtocolError,
    player::{Collaborators, Player},
    transport::{ChannelTransport, QueueTransport, Transport},
    types::{GameEvent, GamePhase, Inbound, MoveRecord, PlayerStage, ProtocolMessage, WireMessage},
    Driver, DriverConfig,
};
use anyhow::{anyhow, bail, ensure, Result};
use async_trait::async_trait;
use ethers::{
    signers::{LocalWallet, Signer},
    types::{Address, Bytes, H256, U256},
};
use sc_battleship_game::{
    board::Board,
    codec::{hash_lock, hash_with_address, ship_commitment, Packed},
    signer::recover,
    updates::{Attack, Payload, RevealSlot, RevealSunk, ShipGeometry},
    MethodCall, MoveKind, Reveal, StateUpdate,
};
use serde::Serialize;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, Mutex};

/// The inbox capacity of a simulated player.
const INBOX_CAPACITY: usize = 256;

/// The game state held by a [SimBattleship].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct GameState {
    move_ctr: U256,
    round: U256,
    channel_counter: U256,
    locked: bool,
    seeded: bool,
    /// Index of the attacking player.
    turn: usize,
    awaiting_reveal: bool,
    last_attack: Option<(u8, u8)>,
    hits: [u64; 2],
    sinks: [usize; 2],
    winner: Option<usize>,
    txs: u64,
}

impl GameState {
    /// The state hash. Lock bookkeeping is excluded so a mirror and its on-chain game hash
    /// equally once seeded.
    fn hash(&self, nonce: U256) -> H256 {
        let (x, y) = self.last_attack.unwrap_or((u8::MAX, u8::MAX));
        Packed::new()
            .uint256(self.move_ctr)
            .uint256(self.round)
            .uint8(self.turn as u8)
            .boolean(self.awaiting_reveal)
            .uint8(x)
            .uint8(y)
            .uint256(U256::from(self.hits[0]))
            .uint256(U256::from(self.hits[1]))
            .uint256(U256::from(self.sinks[0]))
            .uint256(U256::from(self.sinks[1]))
            .uint8(self.winner.map_or(u8::MAX, |w| w as u8))
            .uint256(nonce)
            .keccak()
    }

    fn seed_from(&mut self, source: &GameState) {
        self.move_ctr = source.move_ctr;
        self.round = source.round;
        self.turn = source.turn;
        self.awaiting_reveal = source.awaiting_reveal;
        self.last_attack = source.last_attack;
        self.hits = source.hits;
        self.sinks = source.sinks;
        self.winner = source.winner;
    }

    fn finish_reveal(&mut self) {
        self.awaiting_reveal = false;
        self.turn = 1 - self.turn;
        self.move_ctr += U256::one();
    }
}

/// An in-memory battleship contract. Calls either apply in full or fail without changing state.
#[derive(Debug)]
pub struct SimBattleship {
    address: Address,
    players: [Address; 2],
    state_channel: Address,
    /// The on-chain game ship commitments are bound to.
    game_address: Address,
    commitments: [Vec<H256>; 2],
    on_chain: Option<Arc<SimBattleship>>,
    state: Mutex<GameState>,
}

impl SimBattleship {
    /// Creates an on-chain game between `players`, the first of whom attacks first.
    pub fn new(
        address: Address,
        players: [Address; 2],
        state_channel: Address,
        commitments: [Vec<H256>; 2],
    ) -> Self {
        Self {
            address,
            players,
            state_channel,
            game_address: address,
            commitments,
            on_chain: None,
            state: Mutex::new(GameState {
                seeded: true,
                ..Default::default()
            }),
        }
    }

    /// Creates an unseeded off-chain mirror of `on_chain`.
    fn mirror(address: Address, on_chain: Arc<SimBattleship>) -> Self {
        Self {
            address,
            players: on_chain.players,
            state_channel: on_chain.state_channel,
            game_address: on_chain.address,
            commitments: on_chain.commitments.clone(),
            on_chain: Some(on_chain),
            state: Mutex::new(GameState::default()),
        }
    }

    /// Whether the contract is locked into the channel.
    pub async fn is_locked(&self) -> bool {
        self.state.lock().await.locked
    }

    /// The winner, once a fleet has been sunk.
    pub async fn winner(&self) -> Option<Address> {
        let winner = self.state.lock().await.winner;
        winner.and_then(|index| self.players.get(index).copied())
    }

    async fn snapshot(&self) -> GameState {
        self.state.lock().await.clone()
    }

    fn expect_signer(&self, hash: H256, signature: &Bytes, expected: Address) -> Result<()> {
        let recovered = recover(hash, signature)?;
        ensure!(
            recovered == expected,
            "Signed by {:?}, expected {:?}",
            recovered,
            expected
        );
        Ok(())
    }

    fn expect_both_players(&self, hash: H256, signatures: &[Bytes]) -> Result<()> {
        ensure!(signatures.len() == 2, "Expected two signatures, got {}", signatures.len());
        let mut signers = signatures
            .iter()
            .map(|signature| recover(hash, signature).map_err(anyhow::Error::from))
            .collect::<Result<Vec<_>>>()?;
        signers.sort();
        let mut players = self.players.to_vec();
        players.sort();
        ensure!(signers == players, "Signatures are not from both players");
        Ok(())
    }

    fn ensure_playable(&self, state: &GameState) -> Result<()> {
        ensure!(state.seeded, "Game is not seeded");
        ensure!(!state.locked, "Game is locked");
        ensure!(state.winner.is_none(), "Game is over");
        Ok(())
    }

    fn pending_attack(&self, state: &GameState) -> Result<(u8, u8)> {
        self.ensure_playable(state)?;
        ensure!(state.awaiting_reveal, "No attack to reveal");
        state.last_attack.ok_or(anyhow!("No attack to reveal"))
    }

    fn apply(&self, state: &mut GameState, call: MethodCall, seed: Option<GameState>) -> Result<()> {
        let defender = 1 - state.turn;
        match call {
            MethodCall::Attack { x, y, signature } => {
                self.ensure_playable(state)?;
                ensure!(!state.awaiting_reveal, "Attack while a reveal is pending");
                let hash = Attack { x, y }.hash_data(state.move_ctr, state.round, self.address);
                self.expect_signer(hash, &signature, self.players[state.turn])?;
                state.last_attack = Some((x, y));
                state.awaiting_reveal = true;
                state.move_ctr += U256::one();
            }
            MethodCall::RevealSlot { hit, signature } => {
                let (x, y) = self.pending_attack(state)?;
                let reveal = if hit { Reveal::Hit } else { Reveal::Miss };
                let hash = RevealSlot { x, y, reveal }.hash_data(state.move_ctr, state.round, self.address);
                self.expect_signer(hash, &signature, self.players[defender])?;
                if hit {
                    state.hits[state.turn] += 1;
                }
                state.finish_reveal();
            }
            MethodCall::RevealSunk {
                ship_index,
                x1,
                y1,
                x2,
                y2,
                r,
                signature,
            } => {
                let (x, y) = self.pending_attack(state)?;
                ensure!(ship_index <= U256::from(u64::MAX), "Ship index out of range");
                let ship = ShipGeometry {
                    x1,
                    y1,
                    x2,
                    y2,
                    r,
                    ship_index: ship_index.low_u64(),
                };
                let hash = RevealSunk { x, y, ship }.hash_data(state.move_ctr, state.round, self.address);
                self.expect_signer(hash, &signature, self.players[defender])?;

                let committed = self.commitments[defender]
                    .get(ship.ship_index as usize)
                    .ok_or(anyhow!("Unknown ship {}", ship.ship_index))?;
                let revealed = ship_commitment(
                    x1,
                    y1,
                    x2,
                    y2,
                    r,
                    self.players[defender],
                    state.round,
                    self.game_address,
                );
                ensure!(*committed == revealed, "Ship {} does not match its commitment", ship.ship_index);
                ensure!(ship.covers(x, y), "Ship {} does not cover ({},{})", ship.ship_index, x, y);

                state.hits[state.turn] += 1;
                state.sinks[state.turn] += 1;
                if state.sinks[state.turn] == self.commitments[defender].len() {
                    state.winner = Some(state.turn);
                }
                state.finish_reveal();
            }
            MethodCall::Lock { signatures } => {
                ensure!(!state.locked, "Already locked");
                let hash = hash_lock(state.channel_counter, state.round, self.address);
                self.expect_both_players(hash, &signatures)?;
                state.locked = true;
                state.channel_counter += U256::one();
            }
            MethodCall::Unlock { nonce, signatures } => {
                ensure!(state.locked, "Not locked");
                let seed = seed.ok_or(anyhow!("No on-chain game to seed from"))?;
                let bound = hash_with_address(seed.hash(nonce), self.address);
                self.expect_both_players(bound, &signatures)?;
                state.seed_from(&seed);
                state.locked = false;
                state.seeded = true;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BattleshipContract for SimBattleship {
    fn address(&self) -> Address {
        self.address
    }

    async fn move_ctr(&self) -> Result<U256> {
        Ok(self.state.lock().await.move_ctr)
    }

    async fn round(&self) -> Result<U256> {
        Ok(self.state.lock().await.round)
    }

    async fn channel_counter(&self) -> Result<U256> {
        Ok(self.state.lock().await.channel_counter)
    }

    async fn state_channel(&self) -> Result<Address> {
        Ok(self.state_channel)
    }

    async fn get_state(&self, nonce: U256) -> Result<H256> {
        Ok(self.state.lock().await.hash(nonce))
    }

    async fn send(&self, call: MethodCall, from: Address, gas: u64) -> Result<Receipt> {
        let method = call.method();
        ensure!(gas > 0, "Call to `{}` has no gas", method);
        ensure!(self.players.contains(&from), "Sender {:?} is not a player", from);

        // Read the seed before taking our own lock; the two contracts never lock each other.
        let seed = match (&call, &self.on_chain) {
            (MethodCall::Unlock { .. }, Some(on_chain)) => Some(on_chain.snapshot().await),
            _ => None,
        };

        let mut state = self.state.lock().await;
        let mut next = state.clone();
        self.apply(&mut next, call, seed)
            .map_err(|e| anyhow!("Call to `{}` reverted: {}", method, e))?;
        next.txs += 1;
        let tx_hash = Packed::new()
            .address(self.address)
            .uint256(U256::from(next.txs))
            .keccak();
        *state = next;

        Ok(Receipt {
            method: method.to_string(),
            tx_hash,
            gas_used: None,
        })
    }
}

/// A registry of simulated contracts that also deploys off-chain mirrors.
#[derive(Debug, Default)]
pub struct SimNetwork {
    contracts: Mutex<HashMap<Address, Arc<SimBattleship>>>,
    deployed: AtomicU64,
}

impl SimNetwork {
    /// Creates a new, empty [SimNetwork].
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_address(&self) -> Address {
        let n = self.deployed.fetch_add(1, Ordering::SeqCst) + 1;
        Address::from_low_u64_be(0xba77_1e00_0000 + n)
    }

    /// Deploys an on-chain game between `players`, committing to their boards.
    pub async fn deploy_on_chain(&self, players: [Address; 2], boards: [&Board; 2]) -> Arc<SimBattleship> {
        let address = self.next_address();
        let state_channel = self.next_address();
        let round = U256::zero();
        let commitments = [
            boards[0].commitments(players[0], round, address),
            boards[1].commitments(players[1], round, address),
        ];
        let game = Arc::new(SimBattleship::new(address, players, state_channel, commitments));
        self.contracts.lock().await.insert(address, game.clone());
        tracing::debug!(target: "sim", "Deployed on-chain game at {:?}", address);
        game
    }

    /// The contract deployed at `address`.
    pub async fn contract(&self, address: Address) -> Option<Arc<SimBattleship>> {
        self.contracts.lock().await.get(&address).cloned()
    }
}

#[async_trait]
impl ContractDeployer for SimNetwork {
    async fn deploy_off_chain(
        &self,
        owner: Address,
        counterparty: Address,
        on_chain: Address,
    ) -> Result<Arc<dyn BattleshipContract>> {
        let game = self
            .contract(on_chain)
            .await
            .ok_or(anyhow!("No game deployed at {:?}", on_chain))?;
        ensure!(
            owner != counterparty && game.players.contains(&owner) && game.players.contains(&counterparty),
            "{:?} and {:?} are not the players of {:?}",
            owner,
            counterparty,
            on_chain
        );
        let mirror = Arc::new(SimBattleship::mirror(self.next_address(), game));
        self.contracts.lock().await.insert(mirror.address, mirror.clone());
        tracing::debug!(target: "sim", "Deployed mirror of {:?} for {:?} at {:?}", on_chain, owner, mirror.address);
        Ok(mirror)
    }
}

/// A scripted player: attacks a fixed list of cells and answers attacks from its own board.
#[derive(Debug, Clone)]
pub struct Bot {
    board: Board,
    targets: VecDeque<(u8, u8)>,
}

impl Bot {
    /// Creates a new [Bot] defending `board` and attacking `targets` in order.
    pub fn new(board: Board, targets: impl IntoIterator<Item = (u8, u8)>) -> Self {
        Self {
            board,
            targets: targets.into_iter().collect(),
        }
    }

    /// The move to make in `phase`, if the phase asks for local input.
    pub fn next_move(&mut self, phase: GamePhase) -> Result<Option<Payload>> {
        match phase {
            GamePhase::AwaitAttackInput => {
                let (x, y) = self
                    .targets
                    .pop_front()
                    .ok_or(anyhow!("Bot ran out of targets"))?;
                Ok(Some(Payload::attack(x, y)))
            }
            GamePhase::AwaitRevealInput { x, y } => Ok(Some(self.board.reveal(x, y)?)),
            _ => Ok(None),
        }
    }
}

/// How one player fared in a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerSummary {
    pub address: Address,
    pub won: bool,
    pub moves: usize,
    pub settled_on_chain: usize,
    pub attacks_made: usize,
    pub hit_miss_reveals_received: usize,
    pub sink_reveals_received: usize,
}

impl PlayerSummary {
    /// Summarizes a player's game history.
    pub fn new(address: Address, won: bool, moves: &[MoveRecord]) -> Self {
        let count = |proposed: bool, kind: MoveKind| {
            moves
                .iter()
                .filter(|m| m.proposed == proposed && m.kind == kind)
                .count()
        };
        Self {
            address,
            won,
            moves: moves.len(),
            settled_on_chain: moves.iter().filter(|m| m.settled_on_chain).count(),
            attacks_made: count(true, MoveKind::Attack),
            hit_miss_reveals_received: count(false, MoveKind::RevealSlot),
            sink_reveals_received: count(false, MoveKind::RevealSunk),
        }
    }
}

/// The outcome of a match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchReport {
    pub winner: Option<Address>,
    pub players: Vec<PlayerSummary>,
}

impl MatchReport {
    fn new(players: Vec<PlayerSummary>) -> Self {
        Self {
            winner: players.iter().find(|p| p.won).map(|p| p.address),
            players,
        }
    }
}

/// The two sides of a [Session].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Alice,
    Bob,
}

fn sim_player(
    wallet: LocalWallet,
    counterparty: Address,
    goes_first: bool,
    ship_count: usize,
    game: Arc<SimBattleship>,
    network: Arc<SimNetwork>,
    transport: Arc<dyn Transport>,
) -> (Player, mpsc::UnboundedReceiver<GameEvent>) {
    let (events, receiver) = mpsc::unbounded_channel();
    let collaborators = Collaborators {
        signer: Arc::new(wallet),
        on_chain: game,
        deployer: network,
        transport,
    };
    (
        Player::new(DriverConfig::new(counterparty, goes_first, ship_count), collaborators, events),
        receiver,
    )
}

/// Two players wired back to back through [QueueTransport]s. Nothing moves until the session is
/// pumped, so every interleaving is chosen by the caller. Alice attacks first.
pub struct Session {
    pub network: Arc<SimNetwork>,
    pub game: Arc<SimBattleship>,
    pub alice: Player,
    pub bob: Player,
    /// Messages sent by Alice, not yet delivered to Bob.
    pub alice_outbox: QueueTransport,
    /// Messages sent by Bob, not yet delivered to Alice.
    pub bob_outbox: QueueTransport,
    pub alice_events: mpsc::UnboundedReceiver<GameEvent>,
    pub bob_events: mpsc::UnboundedReceiver<GameEvent>,
}

impl Session {
    /// Deploys a game for the two boards and creates both players.
    pub async fn new(alice: LocalWallet, bob: LocalWallet, alice_board: &Board, bob_board: &Board) -> Result<Self> {
        ensure!(
            alice_board.ships.len() == bob_board.ships.len(),
            "Fleets differ in size"
        );
        let ship_count = alice_board.ships.len();
        let players = [alice.address(), bob.address()];
        let network = SimNetwork::new();
        let game = network.deploy_on_chain(players, [alice_board, bob_board]).await;

        let alice_outbox = QueueTransport::new();
        let bob_outbox = QueueTransport::new();
        let (alice, alice_events) = sim_player(
            alice,
            players[1],
            true,
            ship_count,
            game.clone(),
            network.clone(),
            Arc::new(alice_outbox.clone()),
        );
        let (bob, bob_events) = sim_player(
            bob,
            players[0],
            false,
            ship_count,
            game.clone(),
            network.clone(),
            Arc::new(bob_outbox.clone()),
        );

        Ok(Self {
            network,
            game,
            alice,
            bob,
            alice_outbox,
            bob_outbox,
            alice_events,
            bob_events,
        })
    }

    /// The player on `side`.
    pub fn player(&mut self, side: Side) -> &mut Player {
        match side {
            Side::Alice => &mut self.alice,
            Side::Bob => &mut self.bob,
        }
    }

    /// Delivers queued messages until both outboxes are empty.
    pub async fn pump(&mut self) -> Result<(), ProtocolError> {
        loop {
            if let Some(message) = self.alice_outbox.pop().await {
                self.bob.handle(message).await?;
            } else if let Some(message) = self.bob_outbox.pop().await {
                self.alice.handle(message).await?;
            } else {
                return Ok(());
            }
        }
    }

    /// Signals readiness on both sides.
    pub async fn ready(&mut self) -> Result<(), ProtocolError> {
        self.alice.ready_to_play().await?;
        self.bob.ready_to_play().await?;
        self.pump().await
    }

    /// Locks the on-chain game into the channel and seeds both mirrors.
    pub async fn lock_channel(&mut self) -> Result<(), ProtocolError> {
        self.alice.lock(self.game.address()).await?;
        self.pump().await
    }

    /// Readies both players and opens the channel.
    pub async fn open_channel(&mut self) -> Result<(), ProtocolError> {
        self.ready().await?;
        self.lock_channel().await
    }

    /// Proposes `payload` on `side` and delivers everything that follows.
    pub async fn propose(&mut self, side: Side, payload: Payload) -> Result<(), ProtocolError> {
        self.player(side)
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate { payload }))
            .await?;
        self.pump().await
    }

    /// Lets two bots play until the game ends.
    pub async fn play(&mut self, alice: &mut Bot, bob: &mut Bot, max_moves: usize) -> Result<MatchReport> {
        for _ in 0..max_moves {
            if let Some(report) = self.report() {
                return Ok(report);
            }
            let mut moved = false;
            if let Some(payload) = alice.next_move(self.alice.phase())? {
                self.propose(Side::Alice, payload).await?;
                moved = true;
            }
            if let Some(payload) = bob.next_move(self.bob.phase())? {
                self.propose(Side::Bob, payload).await?;
                moved = true;
            }
            if !moved {
                bail!(
                    "Neither player can move in phases {:?} and {:?}",
                    self.alice.phase(),
                    self.bob.phase()
                );
            }
        }
        self.report()
            .ok_or(anyhow!("Game did not finish within {} moves", max_moves))
    }

    /// The report of a finished game.
    pub fn report(&self) -> Option<MatchReport> {
        let won = |player: &Player| match player.phase() {
            GamePhase::Finished { won } => Some(won),
            _ => None,
        };
        let (alice_won, bob_won) = (won(&self.alice)?, won(&self.bob)?);
        Some(MatchReport::new(vec![
            PlayerSummary::new(self.alice.address(), alice_won, self.alice.moves()),
            PlayerSummary::new(self.bob.address(), bob_won, self.bob.moves()),
        ]))
    }
}

/// The setup of a concurrently played match. Alice attacks first and opens the channel.
pub struct MatchSetup {
    pub alice: LocalWallet,
    pub bob: LocalWallet,
    pub alice_board: Board,
    pub bob_board: Board,
    pub alice_targets: Vec<(u8, u8)>,
    pub bob_targets: Vec<(u8, u8)>,
    pub timeout: Duration,
}

/// Drives one [PlayerDriver] from its event stream the way a game UI would.
struct BotTask {
    address: Address,
    bot: Bot,
    inbox: mpsc::Sender<Inbound>,
    events: mpsc::UnboundedReceiver<GameEvent>,
    lock: Option<Address>,
}

impl BotTask {
    async fn run(mut self) -> Result<PlayerSummary> {
        let mut stage = PlayerStage::None;
        let mut phase = GamePhase::Setup;
        let mut acted = false;
        let mut moves = Vec::new();

        self.send(Inbound::ReadyToPlay).await?;
        while let Some(event) = self.events.recv().await {
            match event {
                GameEvent::StageChanged(next) => stage = next,
                GameEvent::PhaseChanged(next) => {
                    phase = next;
                    acted = false;
                }
                GameEvent::MoveFinalized(record) => moves.push(record),
                GameEvent::ChannelStalled { reason, .. } => bail!("Channel stalled: {}", reason),
            }

            if let GamePhase::Finished { won } = phase {
                return Ok(PlayerSummary::new(self.address, won, &moves));
            }
            if stage == PlayerStage::ReadyToPlay && phase != GamePhase::Setup {
                if let Some(address) = self.lock.take() {
                    self.send(Inbound::Lock(address)).await?;
                }
            }
            if stage == PlayerStage::ReadyToPlayOffChain && !acted {
                if let Some(payload) = self.bot.next_move(phase)? {
                    self.send(Inbound::Message(WireMessage::Update(
                        ProtocolMessage::ProposeStateUpdate { payload },
                    )))
                    .await?;
                    acted = true;
                }
            }
        }
        bail!("Event stream closed before the game finished")
    }

    async fn send(&self, inbound: Inbound) -> Result<()> {
        self.inbox
            .send(inbound)
            .await
            .map_err(|_| anyhow!("Player inbox closed"))
    }
}

/// Plays a full match with each player on its own [PlayerDriver] task: both signal readiness,
/// Alice locks the on-chain game into the channel and the game is played off-chain to the end.
pub async fn run_match(setup: MatchSetup) -> Result<MatchReport> {
    ensure!(
        setup.alice_board.ships.len() == setup.bob_board.ships.len(),
        "Fleets differ in size"
    );
    let ship_count = setup.alice_board.ships.len();
    let players = [setup.alice.address(), setup.bob.address()];
    let network = SimNetwork::new();
    let game = network
        .deploy_on_chain(players, [&setup.alice_board, &setup.bob_board])
        .await;

    let (alice_tx, alice_rx) = mpsc::channel(INBOX_CAPACITY);
    let (bob_tx, bob_rx) = mpsc::channel(INBOX_CAPACITY);
    let (alice, alice_events) = sim_player(
        setup.alice,
        players[1],
        true,
        ship_count,
        game.clone(),
        network.clone(),
        Arc::new(ChannelTransport::new(bob_tx.clone())),
    );
    let (bob, bob_events) = sim_player(
        setup.bob,
        players[0],
        false,
        ship_count,
        game.clone(),
        network.clone(),
        Arc::new(ChannelTransport::new(alice_tx.clone())),
    );

    let alice_driver = tokio::spawn(PlayerDriver::new(alice, alice_rx).start());
    let bob_driver = tokio::spawn(PlayerDriver::new(bob, bob_rx).start());

    let alice_bot = BotTask {
        address: players[0],
        bot: Bot::new(setup.alice_board, setup.alice_targets),
        inbox: alice_tx,
        events: alice_events,
        lock: Some(game.address()),
    };
    let bob_bot = BotTask {
        address: players[1],
        bot: Bot::new(setup.bob_board, setup.bob_targets),
        inbox: bob_tx,
        events: bob_events,
        lock: None,
    };

    let outcome = tokio::time::timeout(setup.timeout, async {
        tokio::try_join!(alice_bot.run(), bob_bot.run())
    })
    .await;
    alice_driver.abort();
    bob_driver.abort();

    let (alice_summary, bob_summary) =
        outcome.map_err(|_| anyhow!("Match did not finish within {:?}", setup.timeout))??;
    tracing::info!(target: "sim", "Match finished after {} moves", alice_summary.moves);
    Ok(MatchReport::new(vec![alice_summary, bob_summary]))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        types::{LifecycleMessage, UpdateStatus},
        DEFAULT_LOCK_GAS, DEFAULT_MOVE_GAS, DEFAULT_STATE_SIG_NONCE,
    };
    use sc_battleship_game::{
        board::{row_major, Ship, DEFAULT_SHIP_SIZES},
        signer::ChannelSigner,
        updates::Verify,
    };

    const KEY_A: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const KEY_B: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const KEY_EVE: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

    fn wallet(key: &str) -> LocalWallet {
        key.parse().unwrap()
    }

    fn addr(wallet: &LocalWallet) -> Address {
        Signer::address(wallet)
    }

    fn salts(seed: u64) -> Vec<U256> {
        (0..DEFAULT_SHIP_SIZES.len() as u64)
            .map(|i| U256::from(seed * 100 + i))
            .collect()
    }

    fn stacked(seed: u64) -> Board {
        Board::stacked(10, &DEFAULT_SHIP_SIZES, &salts(seed)).unwrap()
    }

    /// A fleet whose last ship is sunk by the 19th row-major attack on the top-left 5x5 square,
    /// after two misses.
    fn nineteen_cell_board() -> Board {
        let r = salts(7);
        Board::new(
            10,
            vec![
                Ship::new(0, 0, 4, 0, r[0]).unwrap(),
                Ship::new(0, 1, 3, 1, r[1]).unwrap(),
                Ship::new(0, 2, 2, 2, r[2]).unwrap(),
                Ship::new(1, 3, 3, 3, r[3]).unwrap(),
                Ship::new(3, 2, 4, 2, r[4]).unwrap(),
            ],
        )
        .unwrap()
    }

    async fn session() -> Session {
        Session::new(wallet(KEY_A), wallet(KEY_B), &stacked(1), &stacked(2))
            .await
            .unwrap()
    }

    async fn mirror_move_ctr(session: &Session, address: Option<Address>) -> U256 {
        let mirror = session.network.contract(address.unwrap()).await.unwrap();
        mirror.move_ctr().await.unwrap()
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<GameEvent>) -> Vec<GameEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn take_verify(message: WireMessage) -> (Verify, U256, U256) {
        match message {
            WireMessage::Update(ProtocolMessage::VerifyStateUpdate {
                update,
                move_ctr,
                round,
            }) => (update, move_ctr, round),
            other => panic!("expected a verify message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn lifecycle_opens_the_channel() {
        let mut s = session().await;
        s.open_channel().await.unwrap();

        assert_eq!(s.alice.stage(), PlayerStage::ReadyToPlayOffChain);
        assert_eq!(s.bob.stage(), PlayerStage::ReadyToPlayOffChain);
        assert_eq!(s.alice.phase(), GamePhase::AwaitAttackInput);
        assert_eq!(s.bob.phase(), GamePhase::AwaitCounterpartyAttack);

        let (alice_mirror, bob_mirror) = (s.alice.off_chain_address(), s.bob.off_chain_address());
        assert!(alice_mirror.is_some() && alice_mirror != bob_mirror);
        assert_eq!(s.alice.counterparty_off_chain_address(), bob_mirror);
        assert_eq!(s.bob.counterparty_off_chain_address(), alice_mirror);

        assert!(s.game.is_locked().await);
        for mirror in [alice_mirror, bob_mirror] {
            let mirror = s.network.contract(mirror.unwrap()).await.unwrap();
            assert!(!mirror.is_locked().await);
            assert_eq!(mirror.channel_counter().await.unwrap(), U256::one());
        }
        assert!(drain(&mut s.bob_events)
            .contains(&GameEvent::StageChanged(PlayerStage::ReadyToPlayOffChain)));
    }

    #[tokio::test]
    async fn attack_is_finalized_by_both_parties() {
        let mut s = session().await;
        s.open_channel().await.unwrap();
        s.propose(Side::Alice, Payload::attack(2, 3)).await.unwrap();

        let a = s.alice.latest_move().unwrap().clone();
        let b = s.bob.latest_move().unwrap().clone();
        assert!(a.is_finalized() && b.is_finalized());
        assert!(a.proposed && !b.proposed);
        assert_eq!(a.hash_state, b.hash_state);
        assert_eq!(Some(a.channel_sig.clone()), b.counterparty_channel_sig);
        assert_eq!(Some(b.channel_sig.clone()), a.counterparty_channel_sig);
        assert_eq!(a.dispute_evidence().unwrap().signatures, b.dispute_evidence().unwrap().signatures);

        // The on-chain data signature is enough to replay the move on the real game.
        let data_hash = Payload::attack(2, 3).hash_data(U256::zero(), U256::zero(), s.game.address());
        assert_eq!(recover(data_hash, b.attack_sig.as_ref().unwrap()).unwrap(), addr(&wallet(KEY_A)));

        assert_eq!(s.alice.phase(), GamePhase::AwaitCounterpartyReveal { x: 2, y: 3 });
        assert_eq!(s.bob.phase(), GamePhase::AwaitRevealInput { x: 2, y: 3 });
        assert_eq!((s.alice.channel_round(), s.bob.channel_round()), (1, 1));
        assert_eq!(mirror_move_ctr(&s, s.alice.off_chain_address()).await, U256::one());
        assert_eq!(mirror_move_ctr(&s, s.bob.off_chain_address()).await, U256::one());
        assert_eq!(s.alice.status(), UpdateStatus::Acknowledged);
    }

    #[tokio::test]
    async fn forged_on_chain_signature_stalls_the_verifier() {
        let eve = wallet(KEY_EVE);
        let mut s = session().await;
        s.open_channel().await.unwrap();
        drain(&mut s.bob_events);

        s.alice
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(2, 3),
            }))
            .await
            .unwrap();
        let (mut update, move_ctr, round) = take_verify(s.alice_outbox.pop().await.unwrap());
        update.on_chain_data_sig = ChannelSigner::sign(
            &eve,
            update.payload.hash_data(move_ctr, round, s.game.address()),
        )
        .await
        .unwrap();

        let err = s
            .bob
            .handle(WireMessage::Update(ProtocolMessage::VerifyStateUpdate {
                update,
                move_ctr,
                round,
            }))
            .await
            .unwrap_err();
        match err {
            ProtocolError::SignatureMismatch {
                expected, recovered, ..
            } => {
                assert_eq!(recovered, addr(&eve));
                assert_eq!(expected, addr(&wallet(KEY_A)));
            }
            other => panic!("unexpected error {:?}", other),
        }

        assert_eq!(mirror_move_ctr(&s, s.bob.off_chain_address()).await, U256::zero());
        assert_eq!(s.bob.status(), UpdateStatus::Stalled);
        let stalled = drain(&mut s.bob_events).into_iter().find_map(|event| match event {
            GameEvent::ChannelStalled { evidence, .. } => Some(evidence),
            _ => None,
        });
        assert_eq!(stalled.flatten().unwrap().recovered_signer, Some(addr(&eve)));
        assert!(s.bob_outbox.is_empty().await);

        let err = s
            .bob
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(0, 0),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ChannelStalled));
    }

    #[tokio::test]
    async fn stale_move_counter_is_rejected() {
        let bob = wallet(KEY_B);
        let mut s = session().await;
        s.open_channel().await.unwrap();
        s.propose(Side::Alice, Payload::attack(5, 5)).await.unwrap();
        let miss = stacked(2).reveal(5, 5).unwrap();
        s.propose(Side::Bob, miss).await.unwrap();
        assert_eq!(s.alice.phase(), GamePhase::AwaitCounterpartyAttack);
        assert_eq!(mirror_move_ctr(&s, s.alice.off_chain_address()).await, U256::from(2));

        // Bob's next attack, built against a counter one move behind.
        let stale = U256::one();
        let payload = Payload::attack(6, 6);
        let alice_mirror = s.alice.off_chain_address().unwrap();
        let update = Verify {
            payload,
            state_round: 3,
            on_chain_data_sig: bob
                .sign(payload.hash_data(stale, U256::zero(), s.game.address()))
                .await
                .unwrap(),
            off_chain_data_sig: bob
                .sign(payload.hash_data(stale, U256::zero(), alice_mirror))
                .await
                .unwrap(),
            state_update_sig: bob.sign(H256::repeat_byte(1)).await.unwrap(),
        };

        let err = s
            .alice
            .handle(WireMessage::Update(ProtocolMessage::VerifyStateUpdate {
                update: update.clone(),
                move_ctr: stale,
                round: U256::zero(),
            }))
            .await
            .unwrap_err();
        match err {
            ProtocolError::StaleCounterOrRound {
                field,
                expected,
                actual,
            } => {
                assert_eq!(field, "move counter");
                assert_eq!((expected.as_str(), actual.as_str()), ("2", "1"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(mirror_move_ctr(&s, Some(alice_mirror)).await, U256::from(2));
        assert_eq!(s.alice.status(), UpdateStatus::Stalled);

        // Claiming the current counter does not help: the signatures still bind the old one.
        let mut fresh = session().await;
        fresh.open_channel().await.unwrap();
        fresh.propose(Side::Alice, Payload::attack(5, 5)).await.unwrap();
        fresh.propose(Side::Bob, miss).await.unwrap();
        let err = fresh
            .alice
            .handle(WireMessage::Update(ProtocolMessage::VerifyStateUpdate {
                update,
                move_ctr: U256::from(2),
                round: U256::zero(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::SignatureMismatch { .. }));
    }

    #[tokio::test]
    async fn out_of_order_moves_are_rejected() {
        let mut s = session().await;
        s.open_channel().await.unwrap();

        // A local move out of turn is refused without stalling.
        let err = s
            .bob
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(1, 1),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::OutOfOrderMove { kind: MoveKind::Attack, .. }));
        assert_eq!(s.bob.status(), UpdateStatus::AwaitPropose);

        // A replayed counterparty move is refused and stalls the channel.
        s.alice
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(2, 3),
            }))
            .await
            .unwrap();
        let verify = s.alice_outbox.pop().await.unwrap();
        s.bob.handle(verify.clone()).await.unwrap();
        s.pump().await.unwrap();
        assert!(s.alice.latest_move().unwrap().is_finalized());

        let err = s.bob.handle(verify).await.unwrap_err();
        assert!(matches!(err, ProtocolError::OutOfOrderMove { .. }));
        assert_eq!(s.bob.status(), UpdateStatus::Stalled);
    }

    #[tokio::test]
    async fn messages_before_readiness_are_rejected() {
        let mut s = session().await;
        let err = s
            .alice
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(2, 3),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidPlayerStage(PlayerStage::None)));
        assert_eq!(s.alice.status(), UpdateStatus::AwaitPropose);
        assert!(s.alice.moves().is_empty());
        assert!(s.alice_outbox.is_empty().await);
    }

    #[tokio::test]
    async fn forged_acknowledgement_is_rejected() {
        let eve = wallet(KEY_EVE);
        let mut s = session().await;
        s.open_channel().await.unwrap();

        s.alice
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(2, 3),
            }))
            .await
            .unwrap();
        let verify = s.alice_outbox.pop().await.unwrap();
        s.bob.handle(verify).await.unwrap();

        let forged = match s.bob_outbox.pop().await.unwrap() {
            WireMessage::Update(ProtocolMessage::AcknowledgeStateUpdate { mut update }) => {
                let hash = s.alice.latest_move().unwrap().hash_state;
                update.state_update_sig = ChannelSigner::sign(&eve, hash).await.unwrap();
                update
            }
            other => panic!("expected an acknowledgement, got {:?}", other),
        };
        let err = s
            .alice
            .handle(WireMessage::Update(ProtocolMessage::AcknowledgeStateUpdate {
                update: forged,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::SignatureMismatch { .. }));
        assert!(!s.alice.latest_move().unwrap().is_finalized());
        assert_eq!(s.alice.status(), UpdateStatus::Stalled);
    }

    #[tokio::test]
    async fn forged_channel_signature_stalls_the_verifier() {
        let eve = wallet(KEY_EVE);
        let mut s = session().await;
        s.open_channel().await.unwrap();
        drain(&mut s.bob_events);

        s.alice
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(2, 3),
            }))
            .await
            .unwrap();
        let hash_state = s.alice.latest_move().unwrap().hash_state;
        let (mut update, move_ctr, round) = take_verify(s.alice_outbox.pop().await.unwrap());
        update.state_update_sig = ChannelSigner::sign(&eve, hash_state).await.unwrap();

        let err = s
            .bob
            .handle(WireMessage::Update(ProtocolMessage::VerifyStateUpdate {
                update,
                move_ctr,
                round,
            }))
            .await
            .unwrap_err();
        match &err {
            ProtocolError::SignatureMismatch {
                context,
                recovered,
                hash,
                ..
            } => {
                assert_eq!(*context, "channel state");
                assert_eq!(*recovered, addr(&eve));
                assert_eq!(*hash, hash_state);
            }
            other => panic!("unexpected error {:?}", other),
        }

        assert_eq!(s.bob.status(), UpdateStatus::Stalled);
        assert!(s.bob.moves().is_empty());
        assert!(s.bob_outbox.is_empty().await);
        let stalled = drain(&mut s.bob_events).into_iter().find_map(|event| match event {
            GameEvent::ChannelStalled { evidence, .. } => Some(evidence),
            _ => None,
        });
        assert_eq!(stalled.flatten().unwrap().hash, hash_state);
    }

    #[tokio::test]
    async fn mismatched_state_round_is_rejected() {
        let mut s = session().await;
        s.open_channel().await.unwrap();

        s.alice
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(2, 3),
            }))
            .await
            .unwrap();
        let (mut update, move_ctr, round) = take_verify(s.alice_outbox.pop().await.unwrap());
        update.state_round = 5;
        s.alice_outbox
            .push_front(WireMessage::Update(ProtocolMessage::VerifyStateUpdate {
                update,
                move_ctr,
                round,
            }))
            .await;

        match s.pump().await.unwrap_err() {
            ProtocolError::StaleCounterOrRound {
                field,
                expected,
                actual,
            } => {
                assert_eq!(field, "state round");
                assert_eq!((expected.as_str(), actual.as_str()), ("1", "5"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(mirror_move_ctr(&s, s.bob.off_chain_address()).await, U256::zero());
        assert_eq!(s.bob.channel_round(), 0);
        assert_eq!(s.bob.status(), UpdateStatus::Stalled);
    }

    #[tokio::test]
    async fn short_signature_is_a_format_error() {
        let mut s = session().await;
        s.open_channel().await.unwrap();

        s.alice
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(2, 3),
            }))
            .await
            .unwrap();
        let (mut update, move_ctr, round) = take_verify(s.alice_outbox.pop().await.unwrap());
        update.on_chain_data_sig = Bytes::from(vec![0u8; 64]);

        let err = s
            .bob
            .handle(WireMessage::Update(ProtocolMessage::VerifyStateUpdate {
                update,
                move_ctr,
                round,
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSignatureFormat(_)));
        assert_eq!(mirror_move_ctr(&s, s.bob.off_chain_address()).await, U256::zero());
        assert_eq!(s.bob.status(), UpdateStatus::Stalled);
    }

    #[tokio::test]
    async fn reverted_proposal_can_be_retried() {
        let mut s = session().await;
        s.open_channel().await.unwrap();
        drain(&mut s.alice_events);

        let config = s.alice.config.as_ref().clone();
        s.alice.config = Arc::new(config.clone().with_gas(0, DEFAULT_LOCK_GAS));
        let err = s
            .alice
            .handle(WireMessage::Update(ProtocolMessage::ProposeStateUpdate {
                payload: Payload::attack(2, 3),
            }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ContractCallFailure { method: "attack", .. }
        ));

        // Nothing moved, so nothing is stalled.
        assert_eq!(s.alice.status(), UpdateStatus::AwaitPropose);
        assert_eq!(s.alice.phase(), GamePhase::AwaitAttackInput);
        assert_eq!(mirror_move_ctr(&s, s.alice.off_chain_address()).await, U256::zero());
        assert!(s.alice.moves().is_empty());
        assert!(s.alice_outbox.is_empty().await);
        assert!(!drain(&mut s.alice_events)
            .iter()
            .any(|event| matches!(event, GameEvent::ChannelStalled { .. })));

        s.alice.config = Arc::new(config.with_gas(DEFAULT_MOVE_GAS, DEFAULT_LOCK_GAS));
        s.propose(Side::Alice, Payload::attack(2, 3)).await.unwrap();
        assert_eq!(s.alice.status(), UpdateStatus::Acknowledged);
        assert_eq!((s.alice.channel_round(), s.bob.channel_round()), (1, 1));
        assert!(s.alice.latest_move().unwrap().is_finalized());
        assert_eq!(s.bob.phase(), GamePhase::AwaitRevealInput { x: 2, y: 3 });
    }

    #[tokio::test]
    async fn forged_lock_signature_is_rejected() {
        let eve = wallet(KEY_EVE);
        let mut s = session().await;
        s.ready().await.unwrap();

        s.alice.lock(s.game.address()).await.unwrap();
        let request = s.alice_outbox.pop().await.unwrap();
        s.bob.handle(request).await.unwrap();
        let genuine = s.bob_outbox.pop().await.unwrap();
        assert!(s.bob_outbox.is_empty().await);

        let counter = s.game.channel_counter().await.unwrap();
        let round = s.game.round().await.unwrap();
        let lock_hash = hash_lock(counter, round, s.game.address());
        let forged = WireMessage::Lifecycle(LifecycleMessage::LockSig {
            address: s.game.address(),
            signature: ChannelSigner::sign(&eve, lock_hash).await.unwrap(),
        });
        let err = s.alice.handle(forged).await.unwrap_err();
        match err {
            ProtocolError::SignatureMismatch {
                context, recovered, ..
            } => {
                assert_eq!(context, "lock");
                assert_eq!(recovered, addr(&eve));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!s.game.is_locked().await);
        assert!(s.alice.off_chain_address().is_none());
        assert!(s.alice_outbox.is_empty().await);

        // Setup failures do not stall; the genuine signature still completes the lock.
        s.alice.handle(genuine).await.unwrap();
        s.pump().await.unwrap();
        assert!(s.game.is_locked().await);
        assert_eq!(s.alice.stage(), PlayerStage::ReadyToPlayOffChain);
        assert_eq!(s.bob.stage(), PlayerStage::ReadyToPlayOffChain);
    }

    #[tokio::test]
    async fn stale_lock_request_is_not_countersigned() {
        let mut s = session().await;
        s.ready().await.unwrap();

        let counter = s.game.channel_counter().await.unwrap();
        let err = s
            .bob
            .handle(WireMessage::Lifecycle(LifecycleMessage::RequestLockSig {
                address: s.game.address(),
                channel_counter: counter + 1,
                round: s.game.round().await.unwrap(),
            }))
            .await
            .unwrap_err();
        match err {
            ProtocolError::StaleCounterOrRound {
                field,
                expected,
                actual,
            } => {
                assert_eq!(field, "channel counter");
                assert_eq!(expected, counter.to_string());
                assert_eq!(actual, (counter + 1).to_string());
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(s.bob_outbox.is_empty().await);
        assert_eq!(s.bob.stage(), PlayerStage::ReadyToPlay);
    }

    #[tokio::test]
    async fn forged_seed_signature_keeps_the_mirror_locked() {
        let eve = wallet(KEY_EVE);
        let mut s = session().await;
        s.ready().await.unwrap();
        s.alice.lock(s.game.address()).await.unwrap();

        // Deliver everything until Bob's seed signature for Alice's mirror, which Eve replaces.
        let err = loop {
            if let Some(message) = s.alice_outbox.pop().await {
                s.bob.handle(message).await.unwrap();
                continue;
            }
            match s.bob_outbox.pop().await.unwrap() {
                WireMessage::Lifecycle(LifecycleMessage::StateSig { .. }) => {
                    let state = s
                        .game
                        .get_state(U256::from(DEFAULT_STATE_SIG_NONCE))
                        .await
                        .unwrap();
                    let bound = hash_with_address(state, s.alice.off_chain_address().unwrap());
                    let signature = ChannelSigner::sign(&eve, bound).await.unwrap();
                    break s
                        .alice
                        .handle(WireMessage::Lifecycle(LifecycleMessage::StateSig { signature }))
                        .await
                        .unwrap_err();
                }
                message => s.alice.handle(message).await.unwrap(),
            }
        };
        match err {
            ProtocolError::SignatureMismatch {
                context, recovered, ..
            } => {
                assert_eq!(context, "seed state");
                assert_eq!(recovered, addr(&eve));
            }
            other => panic!("unexpected error {:?}", other),
        }

        let mirror = s
            .network
            .contract(s.alice.off_chain_address().unwrap())
            .await
            .unwrap();
        assert!(mirror.is_locked().await);
        assert_eq!(mirror.move_ctr().await.unwrap(), U256::zero());
        assert_eq!(s.alice.stage(), PlayerStage::ReadyToPlay);
    }

    #[tokio::test]
    async fn on_chain_moves_carry_into_the_channel() {
        let mut s = session().await;
        s.ready().await.unwrap();
        assert_eq!(s.alice.stage(), PlayerStage::ReadyToPlay);

        s.propose(Side::Alice, Payload::attack(0, 0)).await.unwrap();
        assert_eq!(s.bob.phase(), GamePhase::AwaitRevealInput { x: 0, y: 0 });
        let hit = stacked(2).reveal(0, 0).unwrap();
        s.propose(Side::Bob, hit).await.unwrap();

        assert_eq!(s.game.move_ctr().await.unwrap(), U256::from(2));
        assert!(s.alice.moves().iter().all(|m| m.settled_on_chain));
        assert_eq!(s.bob.moves().len(), 2);
        assert_eq!(s.bob.phase(), GamePhase::AwaitAttackInput);

        s.lock_channel().await.unwrap();
        assert_eq!(s.bob.stage(), PlayerStage::ReadyToPlayOffChain);
        assert_eq!(s.bob.phase(), GamePhase::AwaitAttackInput);

        s.propose(Side::Bob, Payload::attack(1, 1)).await.unwrap();
        let record = s.bob.latest_move().unwrap();
        assert!(record.is_finalized() && !record.settled_on_chain);
        assert_eq!(record.state_round, 1);
        assert_eq!(mirror_move_ctr(&s, s.alice.off_chain_address()).await, U256::from(3));
        assert_eq!(s.game.move_ctr().await.unwrap(), U256::from(2));
    }

    #[tokio::test]
    async fn full_game_finalizes_fourteen_reveals_and_five_sinks() {
        let alice_board = stacked(1);
        let bob_board = nineteen_cell_board();
        let mut s = Session::new(wallet(KEY_A), wallet(KEY_B), &alice_board, &bob_board)
            .await
            .unwrap();
        s.open_channel().await.unwrap();

        let mut alice = Bot::new(alice_board, row_major(5));
        let mut bob = Bot::new(bob_board, row_major(5));
        let report = s.play(&mut alice, &mut bob, 100).await.unwrap();

        assert_eq!(report.winner, Some(s.alice.address()));
        assert_eq!(s.alice.phase(), GamePhase::Finished { won: true });
        assert_eq!(s.bob.phase(), GamePhase::Finished { won: false });

        let alice_summary = &report.players[0];
        assert_eq!(alice_summary.attacks_made, 19);
        assert_eq!(alice_summary.hit_miss_reveals_received, 14);
        assert_eq!(alice_summary.sink_reveals_received, 5);
        assert!(s.alice.moves().iter().all(|m| m.is_finalized()));
        assert!(s.bob.moves().iter().all(|m| m.is_finalized()));

        let mirror = s.network.contract(s.alice.off_chain_address().unwrap()).await.unwrap();
        assert_eq!(mirror.winner().await, Some(s.alice.address()));
    }

    #[tokio::test]
    async fn sim_contract_rejects_wrong_signers() {
        let (alice, bob) = (wallet(KEY_A), wallet(KEY_B));
        let network = SimNetwork::new();
        let game = network
            .deploy_on_chain([addr(&alice), addr(&bob)], [&stacked(1), &stacked(2)])
            .await;

        // Bob may not attack first.
        let hash = Payload::attack(0, 0).hash_data(U256::zero(), U256::zero(), game.address());
        let call = Payload::attack(0, 0).method_call(bob.sign(hash).await.unwrap());
        assert!(game.send(call, addr(&bob), 1).await.is_err());

        // A lock needs both players.
        let lock_hash = hash_lock(U256::zero(), U256::zero(), game.address());
        let own = alice.sign(lock_hash).await.unwrap();
        let call = MethodCall::Lock {
            signatures: vec![own.clone(), own],
        };
        assert!(game.send(call, addr(&alice), 1).await.is_err());
        assert!(!game.is_locked().await);

        let call = MethodCall::Lock {
            signatures: vec![
                alice.sign(lock_hash).await.unwrap(),
                bob.sign(lock_hash).await.unwrap(),
            ],
        };
        game.send(call, addr(&alice), 1).await.unwrap();
        assert!(game.is_locked().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_match_runs_to_completion() {
        let (alice, bob) = (wallet(KEY_A), wallet(KEY_B));
        let alice_address = addr(&alice);
        let report = run_match(MatchSetup {
            alice,
            bob,
            alice_board: stacked(1),
            bob_board: stacked(2),
            alice_targets: row_major(5).collect(),
            bob_targets: row_major(5).collect(),
            timeout: Duration::from_secs(30),
        })
        .await
        .unwrap();

        assert_eq!(report.winner, Some(alice_address));
        assert_eq!(report.players[0].sink_reveals_received, 5);
        assert_eq!(report.players[1].sink_reveals_received, 4);
    }
}
