//! Application state: the engine, the challenge catalog and session settings.
//!
//! The catalog is built once at startup from the optional TOML bank and the
//! built-in seeds (bank entries win on id clashes).

use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::{load_engine_config_from_env, EngineConfig, SessionConfig};
use crate::domain::Challenge;
use crate::engine::ChallengeEngine;
use crate::seeds::seed_challenges;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ChallengeEngine>,
    pub by_id: Arc<RwLock<HashMap<String, Challenge>>>,
    pub sessions: SessionConfig,
}

impl AppState {
    /// Build state from env: load config, merge bank and seeds, create the engine.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        Self::from_config(load_engine_config_from_env().unwrap_or_default())
    }

    pub fn from_config(cfg: EngineConfig) -> Self {
        let mut id_map = HashMap::<String, Challenge>::new();
        let bank = cfg.challenges.len();
        for c in cfg.challenges {
            id_map.insert(c.id.clone(), c);
        }

        // Always insert built-in seeds, but don't overwrite bank ids.
        let mut seeded = 0usize;
        for c in seed_challenges() {
            if !id_map.contains_key(&c.id) {
                seeded += 1;
                id_map.insert(c.id.clone(), c);
            }
        }

        let mut count_by_diff: HashMap<String, usize> = HashMap::new();
        for ch in id_map.values() {
            *count_by_diff.entry(ch.difficulty.clone()).or_default() += 1;
        }
        for (diff, count) in count_by_diff {
            info!(target: "challenge", %diff, count, "Startup challenge inventory");
        }
        info!(
            target: "caatuu_engine",
            bank,
            seeded,
            fresh_namespace = cfg.sandbox.fresh_namespace_per_run,
            prelude = cfg.sandbox.prelude.is_some(),
            "Challenge engine configured"
        );

        Self {
            engine: Arc::new(ChallengeEngine::new(cfg.sandbox)),
            by_id: Arc::new(RwLock::new(id_map)),
            sessions: cfg.sessions,
        }
    }

    /// Read-only access to a challenge by id.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn get_challenge(&self, id: &str) -> Option<Challenge> {
        let by_id = self.by_id.read().await;
        by_id.get(id).cloned()
    }

    /// All challenges, ordered by difficulty then id.
    pub async fn list_challenges(&self) -> Vec<Challenge> {
        let by_id = self.by_id.read().await;
        let mut all: Vec<Challenge> = by_id.values().cloned().collect();
        all.sort_by(|a, b| (difficulty_rank(&a.difficulty), &a.id).cmp(&(difficulty_rank(&b.difficulty), &b.id)));
        all
    }

    /// Starts the idle-session sweeper on the current runtime.
    pub fn spawn_session_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let engine = self.engine.clone();
        let ttl = self.sessions.ttl();
        let every = self.sessions.sweep_interval();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            loop {
                tick.tick().await;
                engine.evict_idle_sessions(ttl).await;
            }
        })
    }
}

fn difficulty_rank(d: &str) -> u8 {
    match d {
        "beginner" => 0,
        "intermediate" => 1,
        "advanced" => 2,
        _ => 3,
    }
}
