//! Match state machine and scheduled phase tasks
//!
//! One `GameMatch` exists per server. Its phase fields live behind a single
//! mutex that every transition takes, including the callbacks of the
//! scheduled tasks. The player and object registries are concurrent maps and
//! are touched outside the lock only by per-player operations (moves, chat).
//!
//! Every scheduled task carries the round number it was spawned for and
//! rechecks phase and round under the lock before acting, so a callback that
//! fires after its phase was left early is a no-op.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::MatchTimings;
use crate::net::hub::BroadcastHub;
use crate::net::protocol::{
    sanitize_name, ClientMsg, HitKind, MatchOutcome, RoleAssignment, ServerMsg,
};
use crate::util::time::remaining_secs;

use super::combat::{CombatSystem, RayHit, RayParams, HIT_DAMAGE, WRONG_SHOT_PENALTY};
use super::lobby::ThemeVotes;
use super::physics::{PhysicsSystem, WorldBounds};
use super::placement::PlacementGrid;
use super::registry::{ObjectRegistry, PlayerRegistry, PlayerState, Role, MAX_HEALTH};
use super::snapshot::SnapshotBuilder;
use super::theme::Theme;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    /// Lobby, waiting for a start condition
    Waiting,
    /// Hiders hide, seeker is frozen
    Hiding,
    /// Seeker hunts
    Playing,
    /// Outcome shown, reset pending
    Ended,
}

impl MatchPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchPhase::Waiting => "WAITING",
            MatchPhase::Hiding => "HIDING",
            MatchPhase::Playing => "PLAYING",
            MatchPhase::Ended => "ENDED",
        }
    }

    fn in_round(self) -> bool {
        matches!(self, MatchPhase::Hiding | MatchPhase::Playing)
    }
}

/// Fixed rules of play
#[derive(Debug, Clone, Copy)]
pub struct MatchRules {
    pub world: WorldBounds,
    pub ray: RayParams,
    pub placement: PlacementGrid,
    pub min_players: usize,
    pub hit_damage: u8,
    pub wrong_shot_penalty: u8,
    /// Hiders spawn at least this far from the left/right and top/bottom edges
    pub hider_spawn_inset: (f64, f64),
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            world: WorldBounds::default(),
            ray: RayParams::default(),
            placement: PlacementGrid::default(),
            min_players: 2,
            hit_damage: HIT_DAMAGE,
            wrong_shot_penalty: WRONG_SHOT_PENALTY,
            hider_spawn_inset: (300.0, 200.0),
        }
    }
}

/// Who took the round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Winner {
    Seeker,
    Hiders,
}

/// Handles of the tasks bound to the current phase
#[derive(Default)]
struct ScheduledTasks {
    preroll: Option<JoinHandle<()>>,
    hide: Option<JoinHandle<()>>,
    disguise: Option<JoinHandle<()>>,
    round_timer: Option<JoinHandle<()>>,
    reset: Option<JoinHandle<()>>,
}

impl ScheduledTasks {
    fn cancel(slot: &mut Option<JoinHandle<()>>) {
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }

    fn replace(slot: &mut Option<JoinHandle<()>>, handle: JoinHandle<()>) {
        Self::cancel(slot);
        *slot = Some(handle);
    }

    /// Stop everything tied to HIDING and PLAYING
    fn cancel_round(&mut self) {
        Self::cancel(&mut self.hide);
        Self::cancel(&mut self.disguise);
        Self::cancel(&mut self.round_timer);
    }

    fn cancel_all(&mut self) {
        self.cancel_round();
        Self::cancel(&mut self.preroll);
        Self::cancel(&mut self.reset);
    }
}

/// Match fields guarded by the transition lock
pub struct MatchState {
    pub phase: MatchPhase,
    pub theme: Theme,
    pub seeker_id: Option<String>,
    /// Survives resets so the same player is not picked twice running
    pub previous_seeker_id: Option<String>,
    pub match_started_at: Option<Instant>,
    pub playing_started_at: Option<Instant>,
    /// Bumped at every match start, scheduled tasks compare against it
    pub round: u64,
    pub votes: ThemeVotes,
    pub preroll_pending: bool,
    rng: ChaCha8Rng,
    tasks: ScheduledTasks,
}

impl MatchState {
    fn new(seed: u64) -> Self {
        Self {
            phase: MatchPhase::Waiting,
            theme: Theme::default(),
            seeker_id: None,
            previous_seeker_id: None,
            match_started_at: None,
            playing_started_at: None,
            round: 0,
            votes: ThemeVotes::new(),
            preroll_pending: false,
            rng: ChaCha8Rng::seed_from_u64(seed),
            tasks: ScheduledTasks::default(),
        }
    }
}

/// Point-in-time view for status reporting
#[derive(Debug, Clone)]
pub struct MatchStatus {
    pub phase: MatchPhase,
    pub theme: Theme,
    pub seeker_id: Option<String>,
    pub players: usize,
    pub living_hiders: usize,
    pub objects: usize,
}

/// Pick the next seeker, avoiding the previous one whenever someone else can
/// take the role.
pub fn select_next_seeker<R: Rng>(
    participants: &[String],
    previous: Option<&str>,
    rng: &mut R,
) -> Option<String> {
    if participants.len() <= 1 {
        return participants.first().cloned();
    }

    let fresh: Vec<&String> = participants
        .iter()
        .filter(|id| Some(id.as_str()) != previous)
        .collect();
    let candidates: Vec<&String> = if fresh.is_empty() {
        participants.iter().collect()
    } else {
        fresh
    };

    candidates.choose(rng).map(|id| (*id).clone())
}

/// The authoritative hide-and-seek match
pub struct GameMatch {
    me: Weak<GameMatch>,
    state: Mutex<MatchState>,
    players: PlayerRegistry,
    objects: ObjectRegistry,
    hub: Arc<BroadcastHub>,
    timings: MatchTimings,
    rules: MatchRules,
}

impl GameMatch {
    /// Create the match with default rules
    pub fn new(hub: Arc<BroadcastHub>, timings: MatchTimings, seed: u64) -> Arc<Self> {
        Self::with_rules(hub, timings, MatchRules::default(), seed)
    }

    pub fn with_rules(
        hub: Arc<BroadcastHub>,
        timings: MatchTimings,
        rules: MatchRules,
        seed: u64,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            state: Mutex::new(MatchState::new(seed)),
            players: PlayerRegistry::new(),
            objects: ObjectRegistry::new(),
            hub,
            timings,
            rules,
        })
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    pub fn phase(&self) -> MatchPhase {
        self.state.lock().phase
    }

    pub fn status(&self) -> MatchStatus {
        let st = self.state.lock();
        MatchStatus {
            phase: st.phase,
            theme: st.theme,
            seeker_id: st.seeker_id.clone(),
            players: self.players.len(),
            living_hiders: self.players.living_hider_count(),
            objects: self.objects.len(),
        }
    }

    /// Route one decoded client message
    pub fn handle(&self, conn_id: &str, msg: ClientMsg) {
        match msg {
            ClientMsg::Join { name } => self.join(conn_id, &name),
            ClientMsg::SelectTheme { theme } => self.select_theme(conn_id, theme),
            ClientMsg::RequestStart => self.request_start(conn_id),
            ClientMsg::Move { x, y } => self.move_player(conn_id, x, y),
            ClientMsg::ShootRay {
                origin_x,
                origin_y,
                dir_x,
                dir_y,
            } => self.shoot(conn_id, origin_x, origin_y, dir_x, dir_y),
            ClientMsg::ChangeDisguise => self.change_disguise(conn_id),
            ClientMsg::Chat { text } => self.chat(conn_id, &text),
            // The connection handler closes the socket, cleanup goes through leave()
            ClientMsg::Leave => {}
        }
    }

    // ------------------------------------------------------------------
    // Lobby
    // ------------------------------------------------------------------

    /// Register a player for an open connection
    pub fn join(&self, conn_id: &str, name: &str) {
        let name = sanitize_name(name);
        let st = self.state.lock();

        let mut player = PlayerState::new(conn_id.to_string(), name.clone(), self.players.next_seq());
        if st.phase != MatchPhase::Waiting {
            // Spectates until the next round
            player.alive = false;
        }
        if !self.players.insert(player) {
            debug!(conn_id = %conn_id, "Duplicate join ignored");
            return;
        }

        self.hub.unicast(conn_id, &ServerMsg::Joined { id: conn_id.to_string() });
        self.hub.broadcast(&SnapshotBuilder::player_list(&self.players));
        self.hub.broadcast(&ServerMsg::System {
            text: format!("{name} joined the game"),
        });
        if st.phase != MatchPhase::Waiting {
            self.hub.unicast(
                conn_id,
                &SnapshotBuilder::full_state(st.phase, &self.players, &self.objects),
            );
        } else if !st.votes.is_empty() {
            self.hub.unicast(
                conn_id,
                &ServerMsg::ThemeSelections {
                    selections: st.votes.selections(),
                },
            );
        }

        info!(
            conn_id = %conn_id,
            name = %name,
            player_count = self.players.len(),
            phase = ?st.phase,
            "Player joined"
        );
    }

    /// Record a theme preference and start the pre-roll on consensus
    pub fn select_theme(&self, conn_id: &str, theme: Theme) {
        let mut st = self.state.lock();
        if st.phase != MatchPhase::Waiting {
            debug!(conn_id = %conn_id, "Theme vote outside lobby ignored");
            return;
        }
        let Some(player) = self.players.get(conn_id) else {
            return;
        };

        st.votes.submit(conn_id, &player.display_name, theme);
        self.hub.broadcast(&ServerMsg::ThemeSelections {
            selections: st.votes.selections(),
        });
        debug!(conn_id = %conn_id, theme = %theme, "Theme vote");

        self.check_consensus(&mut st);
    }

    /// Explicit start signal from a joined player
    pub fn request_start(&self, conn_id: &str) {
        let mut st = self.state.lock();
        if st.phase != MatchPhase::Waiting || !self.players.contains(conn_id) {
            return;
        }
        self.start_match(&mut st);
    }

    pub fn chat(&self, conn_id: &str, text: &str) {
        let from = self
            .players
            .get(conn_id)
            .map(|p| p.display_name)
            .unwrap_or_else(|| "Unknown".to_string());
        self.hub.broadcast(&ServerMsg::Chat {
            from,
            text: text.to_string(),
        });
    }

    /// Remove a departed player and settle the round if it hinged on them
    pub fn leave(&self, conn_id: &str) {
        let mut st = self.state.lock();
        let Some(player) = self.players.remove(conn_id) else {
            return;
        };

        self.hub.broadcast(&SnapshotBuilder::player_list(&self.players));
        self.hub.broadcast(&ServerMsg::System {
            text: format!("{} left the game", player.display_name),
        });
        info!(conn_id = %conn_id, phase = ?st.phase, "Player left");

        match st.phase {
            MatchPhase::Waiting => {
                if st.votes.withdraw(conn_id) {
                    self.hub.broadcast(&ServerMsg::ThemeSelections {
                        selections: st.votes.selections(),
                    });
                }
                self.check_consensus(&mut st);
            }
            MatchPhase::Hiding | MatchPhase::Playing => {
                if st.seeker_id.as_deref() == Some(conn_id) {
                    self.end_match(&mut st, Winner::Hiders);
                } else if self.players.living_hider_count() == 0 {
                    self.end_match(&mut st, Winner::Seeker);
                }
            }
            MatchPhase::Ended => {}
        }
    }

    fn check_consensus(&self, st: &mut MatchState) {
        if st.phase != MatchPhase::Waiting || st.preroll_pending {
            return;
        }
        if !st
            .votes
            .is_unanimous_turnout(self.players.len(), self.rules.min_players)
        {
            return;
        }
        let Some(theme) = st.votes.winner() else {
            return;
        };

        st.theme = theme;
        st.preroll_pending = true;
        self.hub.broadcast(&ServerMsg::AllSelected);
        info!(theme = %theme, "Theme consensus reached");
        self.schedule_preroll(st);
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// WAITING -> HIDING
    fn start_match(&self, st: &mut MatchState) {
        if st.phase != MatchPhase::Waiting {
            return;
        }

        ScheduledTasks::cancel(&mut st.tasks.preroll);
        st.preroll_pending = false;

        let participants = self.players.ids();
        if participants.len() < self.rules.min_players {
            self.hub.broadcast(&ServerMsg::System {
                text: format!(
                    "At least {} players are required to start",
                    self.rules.min_players
                ),
            });
            return;
        }

        let previous = st.previous_seeker_id.clone();
        let Some(seeker_id) = select_next_seeker(&participants, previous.as_deref(), &mut st.rng)
        else {
            warn!("No seeker could be selected");
            return;
        };

        let now = Instant::now();
        st.round += 1;
        st.phase = MatchPhase::Hiding;
        st.seeker_id = Some(seeker_id.clone());
        st.previous_seeker_id = Some(seeker_id.clone());
        st.match_started_at = Some(now);
        st.playing_started_at = None;

        let pool = st.theme.object_pool();
        let world = self.rules.world;
        let (center_x, center_y) = world.center();
        let (inset_x, inset_y) = self.rules.hider_spawn_inset;
        let rng = &mut st.rng;

        self.players.for_each_mut(|p| {
            p.health = MAX_HEALTH;
            p.alive = true;
            p.last_disguise_change = Some(now);
            if p.id == seeker_id {
                p.role = Role::Seeker;
                p.disguise = None;
                p.x = center_x;
                p.y = center_y;
                p.can_move = false;
            } else {
                p.role = Role::Hider;
                p.disguise = pool.choose(rng).map(|kind| kind.to_string());
                p.x = rng.gen_range(inset_x..world.width - inset_x);
                p.y = rng.gen_range(inset_y..world.height - inset_y);
                p.can_move = true;
            }
        });

        let placed = self.rules.placement.generate(&world, pool, &mut st.rng);
        let object_count = placed.len();
        self.objects.replace_all(placed);

        self.hub.broadcast(&ServerMsg::MatchStart {
            seeker_id: seeker_id.clone(),
            hide_duration_ms: self.timings.hide_duration.as_millis() as u64,
            theme: st.theme,
        });
        self.hub.broadcast(&SnapshotBuilder::initial_objects(&self.objects));
        for player in self.players.snapshot() {
            let role = match player.role {
                Role::Seeker => RoleAssignment::Seeker {
                    x: player.x,
                    y: player.y,
                },
                Role::Hider => RoleAssignment::Hider {
                    disguise: player.disguise.clone().unwrap_or_default(),
                    x: player.x,
                    y: player.y,
                },
            };
            self.hub.unicast(&player.id, &ServerMsg::Role(role));
        }

        info!(
            round = st.round,
            seeker_id = %seeker_id,
            theme = %st.theme,
            player_count = participants.len(),
            object_count,
            "Match started"
        );

        self.schedule_hide_timer(st);
    }

    /// HIDING|PLAYING -> ENDED
    fn end_match(&self, st: &mut MatchState, winner: Winner) {
        if !st.phase.in_round() {
            return;
        }

        st.phase = MatchPhase::Ended;
        st.tasks.cancel_round();

        let outcome = match winner {
            Winner::Seeker => MatchOutcome::SeekerWin {
                seeker_name: st
                    .seeker_id
                    .as_deref()
                    .and_then(|id| self.players.get(id))
                    .map(|p| p.display_name)
                    .unwrap_or_else(|| "Seeker".to_string()),
            },
            Winner::Hiders => MatchOutcome::HidersWin,
        };
        self.hub.broadcast(&ServerMsg::MatchEnd(outcome));
        info!(round = st.round, winner = ?winner, "Match ended");

        self.schedule_reset(st);
    }

    /// ENDED -> WAITING
    fn reset_match(&self, st: &mut MatchState) {
        st.phase = MatchPhase::Waiting;
        st.seeker_id = None;
        st.match_started_at = None;
        st.playing_started_at = None;
        st.preroll_pending = false;
        st.votes.clear();
        st.tasks.cancel_all();

        self.objects.clear();
        self.players.for_each_mut(PlayerState::reset);

        self.hub.broadcast(&ServerMsg::MatchReset);
        info!(round = st.round, "Match reset");
    }

    // ------------------------------------------------------------------
    // Scheduled tasks
    // ------------------------------------------------------------------

    fn schedule_preroll(&self, st: &mut MatchState) {
        let me = self.me.clone();
        let round = st.round;
        let delay = self.timings.preroll_delay;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(game) = me.upgrade() {
                game.on_preroll_elapsed(round);
            }
        });
        ScheduledTasks::replace(&mut st.tasks.preroll, handle);
    }

    fn schedule_hide_timer(&self, st: &mut MatchState) {
        let me = self.me.clone();
        let round = st.round;
        let delay = self.timings.hide_duration;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(game) = me.upgrade() {
                game.on_hide_elapsed(round);
            }
        });
        ScheduledTasks::replace(&mut st.tasks.hide, handle);
    }

    fn schedule_playing_tasks(&self, st: &mut MatchState) {
        let round = st.round;

        let me = self.me.clone();
        let period = self.timings.disguise_interval;
        let disguise = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(game) = me.upgrade() else { break };
                if !game.on_disguise_tick(round) {
                    break;
                }
            }
        });
        ScheduledTasks::replace(&mut st.tasks.disguise, disguise);

        let me = self.me.clone();
        let period = self.timings.countdown_tick;
        let round_timer = tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let Some(game) = me.upgrade() else { break };
                if !game.on_round_tick(round) {
                    break;
                }
            }
        });
        ScheduledTasks::replace(&mut st.tasks.round_timer, round_timer);
    }

    fn schedule_reset(&self, st: &mut MatchState) {
        let me = self.me.clone();
        let round = st.round;
        let delay = self.timings.end_cooldown;
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(game) = me.upgrade() {
                game.on_cooldown_elapsed(round);
            }
        });
        ScheduledTasks::replace(&mut st.tasks.reset, handle);
    }

    fn on_preroll_elapsed(&self, round: u64) {
        let mut st = self.state.lock();
        if st.phase != MatchPhase::Waiting || st.round != round || !st.preroll_pending {
            return;
        }
        st.tasks.preroll = None;
        self.start_match(&mut st);
    }

    /// HIDING -> PLAYING
    fn on_hide_elapsed(&self, round: u64) {
        let mut st = self.state.lock();
        if st.phase != MatchPhase::Hiding || st.round != round {
            return;
        }
        st.tasks.hide = None;
        st.phase = MatchPhase::Playing;
        st.playing_started_at = Some(Instant::now());
        if let Some(seeker_id) = st.seeker_id.as_deref() {
            self.players.update(seeker_id, |p| p.can_move = true);
        }

        self.hub.broadcast(&ServerMsg::PhasePlaying);
        self.hub.broadcast(&SnapshotBuilder::full_state(
            st.phase,
            &self.players,
            &self.objects,
        ));
        info!(round, "Hiding over, seeker released");

        self.schedule_playing_tasks(&mut st);
    }

    /// Returns false once the task should stop
    fn on_disguise_tick(&self, round: u64) -> bool {
        let mut st = self.state.lock();
        if st.phase != MatchPhase::Playing || st.round != round {
            return false;
        }

        let pool = st.theme.object_pool();
        let now = Instant::now();
        let rng = &mut st.rng;
        self.players.for_each_mut(|p| {
            if p.is_living_hider() {
                if let Some(kind) = pool.choose(rng) {
                    p.disguise = Some(kind.to_string());
                    p.last_disguise_change = Some(now);
                }
            }
        });

        self.hub.broadcast(&SnapshotBuilder::full_state(
            st.phase,
            &self.players,
            &self.objects,
        ));
        debug!(round, "Disguises rotated");
        true
    }

    /// Returns false once the task should stop
    fn on_round_tick(&self, round: u64) -> bool {
        let mut st = self.state.lock();
        if st.phase != MatchPhase::Playing || st.round != round {
            return false;
        }
        let Some(started) = st.playing_started_at else {
            return false;
        };

        let remaining = self.timings.round_time_limit.saturating_sub(started.elapsed());
        self.hub.broadcast(&ServerMsg::Countdown {
            seconds: remaining_secs(remaining),
        });

        if remaining.is_zero() {
            info!(round, "Round time limit reached");
            self.end_match(&mut st, Winner::Hiders);
            return false;
        }
        true
    }

    fn on_cooldown_elapsed(&self, round: u64) {
        let mut st = self.state.lock();
        if st.phase != MatchPhase::Ended || st.round != round {
            return;
        }
        st.tasks.reset = None;
        self.reset_match(&mut st);
    }

    // ------------------------------------------------------------------
    // In-round actions
    // ------------------------------------------------------------------

    /// Move to an absolute position. Out-of-bounds targets are rejected and
    /// the player stays put.
    pub fn move_player(&self, conn_id: &str, x: f64, y: f64) {
        let (phase, started_at) = {
            let st = self.state.lock();
            (st.phase, st.match_started_at)
        };

        if !self.rules.world.is_walkable(x, y) {
            debug!(conn_id = %conn_id, x, y, "Out of bounds move rejected");
            return;
        }

        let hide_duration = self.timings.hide_duration;
        let moved = self
            .players
            .update(conn_id, |p| {
                if !p.alive {
                    return false;
                }
                if !p.can_move {
                    let thawed = p.is_seeker()
                        && started_at.is_some_and(|t| t.elapsed() >= hide_duration);
                    if !thawed {
                        return false;
                    }
                    p.can_move = true;
                }
                p.x = x;
                p.y = y;
                true
            })
            .unwrap_or(false);

        if !moved {
            return;
        }

        let msg = ServerMsg::PlayerMoved {
            id: conn_id.to_string(),
            x,
            y,
        };
        if phase == MatchPhase::Playing {
            self.hub.broadcast(&msg);
        } else {
            self.hub.unicast(conn_id, &msg);
        }
    }

    /// Fire a ray. Only a living seeker may shoot, and only while PLAYING;
    /// anything else is silently ignored.
    pub fn shoot(&self, conn_id: &str, origin_x: f64, origin_y: f64, dir_x: f64, dir_y: f64) {
        let Some((dir_x, dir_y)) = PhysicsSystem::normalize(dir_x, dir_y) else {
            return;
        };

        let mut st = self.state.lock();
        if st.phase != MatchPhase::Playing {
            return;
        }
        let Some(shooter) = self.players.get(conn_id) else {
            return;
        };
        if !shooter.is_seeker() || !shooter.alive {
            return;
        }

        let result = CombatSystem::raycast(
            origin_x,
            origin_y,
            dir_x,
            dir_y,
            &self.players.hider_targets(),
            &self.objects.targets(),
            &self.rules.world,
            &self.rules.ray,
        );

        self.hub.broadcast(&ServerMsg::Trajectory {
            start_x: origin_x,
            start_y: origin_y,
            end_x: result.end_x,
            end_y: result.end_y,
        });
        debug!(conn_id = %conn_id, hit = ?result.hit, "Shot resolved");

        match result.hit {
            RayHit::Player { id } => self.resolve_player_hit(&mut st, &id),
            RayHit::Object { id } => {
                self.resolve_wrong_shot(&mut st, conn_id, &id, result.end_x, result.end_y)
            }
            RayHit::None => {}
        }
    }

    fn resolve_player_hit(&self, st: &mut MatchState, victim_id: &str) {
        let damage = self.rules.hit_damage;
        let outcome = self
            .players
            .update(victim_id, |victim| {
                if !victim.alive {
                    return None;
                }
                let (health, dead) = CombatSystem::apply_damage(victim.health, damage);
                victim.health = health;
                if dead {
                    victim.alive = false;
                    victim.disguise = None;
                }
                Some((victim.x, victim.y, victim.display_name.clone(), dead))
            })
            .flatten();
        let Some((x, y, name, dead)) = outcome else {
            return;
        };

        self.hub.broadcast(&ServerMsg::Hit {
            kind: HitKind::Player,
            id: victim_id.to_string(),
            x,
            y,
        });

        if dead {
            self.hub.broadcast(&ServerMsg::PlayerEliminated {
                id: victim_id.to_string(),
                name,
            });
            info!(victim_id = %victim_id, "Hider eliminated");
            if self.players.living_hider_count() == 0 {
                self.end_match(st, Winner::Seeker);
                return;
            }
        }

        self.hub.broadcast(&SnapshotBuilder::full_state(
            st.phase,
            &self.players,
            &self.objects,
        ));
    }

    fn resolve_wrong_shot(
        &self,
        st: &mut MatchState,
        shooter_id: &str,
        object_id: &str,
        hit_x: f64,
        hit_y: f64,
    ) {
        let penalty = self.rules.wrong_shot_penalty;
        let Some((health, dead)) = self.players.update(shooter_id, |seeker| {
            let (health, dead) = CombatSystem::apply_damage(seeker.health, penalty);
            seeker.health = health;
            if dead {
                seeker.alive = false;
            }
            (health, dead)
        }) else {
            return;
        };

        self.hub.broadcast(&ServerMsg::WrongShot {
            shooter_id: shooter_id.to_string(),
            health,
        });
        self.hub.broadcast(&ServerMsg::Hit {
            kind: HitKind::Object,
            id: object_id.to_string(),
            x: hit_x,
            y: hit_y,
        });

        if dead {
            self.hub.broadcast(&ServerMsg::SeekerEliminated {
                id: shooter_id.to_string(),
            });
            self.end_match(st, Winner::Hiders);
            return;
        }

        self.hub.broadcast(&SnapshotBuilder::full_state(
            st.phase,
            &self.players,
            &self.objects,
        ));
    }

    /// Manual disguise swap, at most once per disguise interval
    pub fn change_disguise(&self, conn_id: &str) {
        let mut st = self.state.lock();
        if !st.phase.in_round() {
            return;
        }

        let pool = st.theme.object_pool();
        let cooldown = self.timings.disguise_interval;
        let now = Instant::now();
        let rng = &mut st.rng;
        let changed = self
            .players
            .update(conn_id, |p| {
                if !p.is_living_hider() {
                    return None;
                }
                let ready = p
                    .last_disguise_change
                    .map_or(true, |t| now.duration_since(t) >= cooldown);
                if !ready {
                    return None;
                }
                let kind = pool.choose(rng)?.to_string();
                p.disguise = Some(kind.clone());
                p.last_disguise_change = Some(now);
                Some(kind)
            })
            .flatten();

        if let Some(disguise) = changed {
            self.hub.broadcast(&ServerMsg::DisguiseChanged {
                id: conn_id.to_string(),
                disguise,
            });
        }
    }
}

impl Drop for GameMatch {
    fn drop(&mut self) {
        self.state.get_mut().tasks.cancel_all();
    }
}
