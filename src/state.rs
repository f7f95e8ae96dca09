//! Application state: the local question-set bank, the optional remote
//! store, and the engine implementations the routes dispatch to.
//!
//! The bank doubles as a cache: remote fetches land here, so a session's
//! sets are resolved over the network at most once per process.

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::bank::seed_question_sets;
use crate::config::load_bank_config_from_env;
use crate::domain::QuestionSet;
use crate::engine::{BuiltinGenerator, BuiltinScorer, QuestionGenerator, ScoreEngine};
use crate::error::AssessError;
use crate::session::SessionState;
use crate::store::RemoteStore;

pub struct AppState {
    pub bank: RwLock<BTreeMap<String, QuestionSet>>,
    pub remote: Option<RemoteStore>,
    pub generator: Box<dyn QuestionGenerator>,
    pub scorer: Box<dyn ScoreEngine>,
    pub file_base_url: String,
}

impl AppState {
    /// Build state from env: load the TOML bank, add built-in sets, and
    /// construct the remote store client when configured.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_bank_config_from_env().unwrap_or_default();
        let file_base_url = cfg.files.base_url.clone();

        let mut bank = BTreeMap::new();
        let mut from_config = 0usize;
        for qs in cfg.questionsets {
            if qs.parts.is_empty() {
                warn!(target: "question", id = %qs.id, "Skipping bank entry with no parts");
                continue;
            }
            bank.insert(qs.id.clone(), qs);
            from_config += 1;
        }
        // Built-in sets never overwrite configured ones.
        let mut builtin = 0usize;
        for qs in seed_question_sets() {
            if !bank.contains_key(&qs.id) {
                builtin += 1;
                bank.insert(qs.id.clone(), qs);
            }
        }
        info!(target: "question", from_config, builtin, "Startup question bank inventory");

        let remote = RemoteStore::from_env();
        if let Some(store) = &remote {
            info!(target: "assess_backend", base_url = %store.base_url, "Remote question-set store enabled.");
        } else {
            info!(target: "assess_backend", "Remote question-set store disabled (no QSET_STORE_URL). Using local bank only.");
        }

        Self {
            bank: RwLock::new(bank),
            remote,
            generator: Box::new(BuiltinGenerator),
            scorer: Box::new(BuiltinScorer),
            file_base_url,
        }
    }

    /// Resolve every question set a session references: local bank first,
    /// then one batched remote fetch for the remainder. Any id still missing
    /// afterwards fails the whole call.
    #[instrument(level = "debug", skip_all)]
    pub async fn question_sets_for(
        &self,
        session: &SessionState,
    ) -> Result<BTreeMap<String, QuestionSet>, AssessError> {
        let wanted: BTreeSet<String> = session.question_sets.values().cloned().collect();
        let mut resolved = BTreeMap::new();
        let mut missing = Vec::new();
        {
            let bank = self.bank.read().await;
            for id in &wanted {
                match bank.get(id) {
                    Some(qs) => {
                        resolved.insert(id.clone(), qs.clone());
                    }
                    None => missing.push(id.clone()),
                }
            }
        }

        if !missing.is_empty() {
            if let Some(store) = &self.remote {
                let fetched = store.fetch(&missing).await?;
                let mut bank = self.bank.write().await;
                for (id, qs) in fetched {
                    bank.insert(id.clone(), qs.clone());
                    resolved.insert(id, qs);
                }
            }
        }

        if let Some(id) = wanted.iter().find(|id| !resolved.contains_key(*id)) {
            return Err(AssessError::UnknownQuestionSet { id: id.clone() });
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_builtin_sets_and_rejects_unknown_ids() {
        let state = AppState::new();

        let mut session = SessionState::default();
        session.seeds.insert(0, 1);
        session.question_sets.insert(0, "seed-sum".into());
        let resolved = state.question_sets_for(&session).await.expect("resolve");
        assert!(resolved.contains_key("seed-sum"));

        session.seeds.insert(1, 2);
        session.question_sets.insert(1, "no-such-set".into());
        let err = state.question_sets_for(&session).await.unwrap_err();
        assert!(matches!(err, AssessError::UnknownQuestionSet { .. }));
    }
}
