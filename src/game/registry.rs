//! Concurrent player and concealment object registries

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::time::Instant;

use crate::net::protocol::{ObjectRecord, PlayerRecord};

use super::combat::{ObjectTarget, PlayerTarget};

/// Full health
pub const MAX_HEALTH: u8 = 100;

/// Where players stand between matches
pub const LOBBY_POSITION: (f64, f64) = (100.0, 100.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Seeker,
    Hider,
}

/// Player state (authoritative)
#[derive(Debug, Clone)]
pub struct PlayerState {
    /// Connection id
    pub id: String,
    pub display_name: String,
    pub role: Role,
    /// Always within 0..=MAX_HEALTH
    pub health: u8,
    pub alive: bool,
    pub x: f64,
    pub y: f64,
    pub disguise: Option<String>,
    pub can_move: bool,
    pub last_disguise_change: Option<Instant>,
    /// Join order, used for stable listings
    pub joined_seq: u64,
}

impl PlayerState {
    pub fn new(id: String, display_name: String, joined_seq: u64) -> Self {
        Self {
            id,
            display_name,
            role: Role::Hider,
            health: MAX_HEALTH,
            alive: true,
            x: LOBBY_POSITION.0,
            y: LOBBY_POSITION.1,
            disguise: None,
            can_move: true,
            last_disguise_change: None,
            joined_seq,
        }
    }

    pub fn is_seeker(&self) -> bool {
        self.role == Role::Seeker
    }

    /// Alive hider, the only kind of player a shot can hit
    pub fn is_living_hider(&self) -> bool {
        self.alive && self.role == Role::Hider
    }

    /// Back to lobby defaults, keeping identity
    pub fn reset(&mut self) {
        self.role = Role::Hider;
        self.health = MAX_HEALTH;
        self.alive = true;
        self.x = LOBBY_POSITION.0;
        self.y = LOBBY_POSITION.1;
        self.disguise = None;
        self.can_move = true;
        self.last_disguise_change = None;
    }

    pub fn to_record(&self) -> PlayerRecord {
        PlayerRecord {
            id: self.id.clone(),
            name: self.display_name.clone(),
            is_seeker: self.is_seeker(),
            alive: self.alive,
            health: self.health,
            x: self.x,
            y: self.y,
            disguise: self.disguise.clone(),
        }
    }
}

/// Decoy placed on the map
#[derive(Debug, Clone, PartialEq)]
pub struct ConcealmentObject {
    pub id: String,
    /// Theme object type
    pub kind: String,
    pub x: f64,
    pub y: f64,
}

impl ConcealmentObject {
    pub fn to_record(&self) -> ObjectRecord {
        ObjectRecord {
            id: self.id.clone(),
            kind: self.kind.clone(),
            x: self.x,
            y: self.y,
        }
    }
}

/// Registry of joined players keyed by connection id
#[derive(Default)]
pub struct PlayerRegistry {
    players: DashMap<String, PlayerState>,
    next_seq: AtomicU64,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join sequence for the next player
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Insert unless the id is already present, returns whether it was added
    pub fn insert(&self, player: PlayerState) -> bool {
        match self.players.entry(player.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(player);
                true
            }
        }
    }

    pub fn remove(&self, id: &str) -> Option<PlayerState> {
        self.players.remove(id).map(|(_, p)| p)
    }

    pub fn get(&self, id: &str) -> Option<PlayerState> {
        self.players.get(id).map(|p| p.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.players.contains_key(id)
    }

    /// Mutate one player in place
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut PlayerState) -> R) -> Option<R> {
        self.players.get_mut(id).map(|mut p| f(p.value_mut()))
    }

    /// Mutate every player in place
    pub fn for_each_mut(&self, mut f: impl FnMut(&mut PlayerState)) {
        for mut entry in self.players.iter_mut() {
            f(entry.value_mut());
        }
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// All players in join order
    pub fn snapshot(&self) -> Vec<PlayerState> {
        let mut players: Vec<PlayerState> =
            self.players.iter().map(|p| p.value().clone()).collect();
        players.sort_by_key(|p| p.joined_seq);
        players
    }

    pub fn ids(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|p| p.id).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|p| p.display_name).collect()
    }

    pub fn living_hider_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_living_hider()).count()
    }

    /// Living hiders as ray targets, in id order
    pub fn hider_targets(&self) -> Vec<PlayerTarget> {
        let mut targets: Vec<PlayerTarget> = self
            .players
            .iter()
            .filter(|p| p.is_living_hider())
            .map(|p| PlayerTarget {
                id: p.id.clone(),
                x: p.x,
                y: p.y,
            })
            .collect();
        targets.sort_by(|a, b| a.id.cmp(&b.id));
        targets
    }
}

/// Registry of placed concealment objects keyed by object id
#[derive(Default)]
pub struct ObjectRegistry {
    objects: DashMap<String, ConcealmentObject>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, object: ConcealmentObject) {
        self.objects.insert(object.id.clone(), object);
    }

    /// Swap the whole map for a freshly generated one
    pub fn replace_all(&self, objects: Vec<ConcealmentObject>) {
        self.objects.clear();
        for object in objects {
            self.insert(object);
        }
    }

    pub fn clear(&self) {
        self.objects.clear();
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All objects in placement order (`OBJ_2` before `OBJ_10`)
    pub fn snapshot(&self) -> Vec<ConcealmentObject> {
        let mut objects: Vec<ConcealmentObject> =
            self.objects.iter().map(|o| o.value().clone()).collect();
        objects.sort_by(|a, b| a.id.len().cmp(&b.id.len()).then_with(|| a.id.cmp(&b.id)));
        objects
    }

    pub fn targets(&self) -> Vec<ObjectTarget> {
        self.snapshot()
            .into_iter()
            .map(|o| ObjectTarget {
                id: o.id,
                x: o.x,
                y: o.y,
            })
            .collect()
    }
}
