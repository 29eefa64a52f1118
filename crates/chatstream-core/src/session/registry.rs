//! SessionRegistry - the cached session list and the active-session pointer.
//!
//! Every operation calls the backend first and touches local state only once
//! the call succeeded, so a failure never leaves a half-applied change.

use super::state::{SessionDetail, SessionId, SessionSummary};
use crate::backend::ChatBackend;
use crate::error::ChatError;

/// Known sessions and which one is active.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<SessionSummary>,
    active: Option<SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached session list, in the order the backend returned it.
    pub fn sessions(&self) -> &[SessionSummary] {
        &self.sessions
    }

    pub fn active(&self) -> Option<&SessionId> {
        self.active.as_ref()
    }

    pub fn get(&self, id: &SessionId) -> Option<&SessionSummary> {
        self.sessions.iter().find(|s| &s.id == id)
    }

    /// Fetch and cache the session list.
    pub fn refresh(&mut self, backend: &dyn ChatBackend) -> Result<&[SessionSummary], ChatError> {
        let sessions = backend.list_sessions().map_err(ChatError::SessionList)?;
        log::debug!("Loaded {} session(s)", sessions.len());
        self.sessions = sessions;
        Ok(&self.sessions)
    }

    /// Create a session, prepend it to the cache and make it active.
    pub fn create(&mut self, backend: &dyn ChatBackend) -> Result<SessionId, ChatError> {
        let summary = backend.create_session().map_err(ChatError::SessionCreate)?;
        let id = summary.id.clone();
        log::info!("Created session {}", id);

        self.sessions.retain(|s| s.id != id);
        self.sessions.insert(0, summary);
        self.active = Some(id.clone());
        Ok(id)
    }

    /// Fetch full session state and make it active.
    pub fn load(
        &mut self,
        backend: &dyn ChatBackend,
        id: &SessionId,
    ) -> Result<SessionDetail, ChatError> {
        let detail = backend
            .get_session(id)
            .map_err(|source| ChatError::SessionLoad {
                id: id.clone(),
                source,
            })?;
        log::info!("Loaded session {} ({} messages)", id, detail.messages.len());

        if let Some(cached) = self.sessions.iter_mut().find(|s| &s.id == id) {
            cached.message_count = Some(detail.messages.len() as u64);
        }
        self.active = Some(id.clone());
        Ok(detail)
    }

    /// Delete a session and drop it from the cache.
    ///
    /// Returns whether the deleted session was the active one (which is then
    /// cleared).
    pub fn delete(&mut self, backend: &dyn ChatBackend, id: &SessionId) -> Result<bool, ChatError> {
        backend
            .delete_session(id)
            .map_err(|source| ChatError::SessionDelete {
                id: id.clone(),
                source,
            })?;
        log::info!("Deleted session {}", id);

        self.sessions.retain(|s| &s.id != id);
        let was_active = self.active.as_ref() == Some(id);
        if was_active {
            self.active = None;
        }
        Ok(was_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Op, ScriptedBackend};

    fn ids(registry: &SessionRegistry) -> Vec<&str> {
        registry.sessions().iter().map(|s| s.id.as_str()).collect()
    }

    mod refresh {
        use super::*;

        #[test]
        fn caches_backend_order() {
            let backend = ScriptedBackend::with_sessions(&["s3", "s2", "s1"]);
            let mut registry = SessionRegistry::new();

            registry.refresh(&backend).unwrap();
            assert_eq!(ids(&registry), vec!["s3", "s2", "s1"]);
        }

        #[test]
        fn failure_keeps_previous_cache() {
            let backend = ScriptedBackend::with_sessions(&["s1"]);
            let mut registry = SessionRegistry::new();
            registry.refresh(&backend).unwrap();

            backend.fail(Op::List);
            assert!(matches!(
                registry.refresh(&backend),
                Err(ChatError::SessionList(_))
            ));
            assert_eq!(ids(&registry), vec!["s1"]);
        }
    }

    mod create {
        use super::*;

        #[test]
        fn prepends_and_activates() {
            let backend = ScriptedBackend::with_sessions(&["old"]);
            let mut registry = SessionRegistry::new();
            registry.refresh(&backend).unwrap();

            let id = registry.create(&backend).unwrap();

            assert_eq!(ids(&registry)[0], id.as_str());
            assert_eq!(registry.sessions().len(), 2);
            assert_eq!(registry.active(), Some(&id));
        }

        #[test]
        fn failure_mutates_nothing() {
            let backend = ScriptedBackend::new();
            backend.fail(Op::Create);
            let mut registry = SessionRegistry::new();

            assert!(matches!(
                registry.create(&backend),
                Err(ChatError::SessionCreate(_))
            ));
            assert!(registry.sessions().is_empty());
            assert!(registry.active().is_none());
        }
    }

    mod load {
        use super::*;

        #[test]
        fn activates_and_updates_count() {
            let backend = ScriptedBackend::with_sessions(&["s1"]);
            let mut registry = SessionRegistry::new();
            registry.refresh(&backend).unwrap();

            let id = SessionId::from("s1");
            let detail = registry.load(&backend, &id).unwrap();

            assert!(detail.messages.is_empty());
            assert_eq!(registry.active(), Some(&id));
            assert_eq!(registry.get(&id).unwrap().message_count, Some(0));
        }

        #[test]
        fn failure_keeps_previous_active() {
            let backend = ScriptedBackend::with_sessions(&["s1", "s2"]);
            let mut registry = SessionRegistry::new();
            registry.load(&backend, &SessionId::from("s1")).unwrap();

            backend.fail(Op::Get);
            let result = registry.load(&backend, &SessionId::from("s2"));

            assert!(matches!(result, Err(ChatError::SessionLoad { .. })));
            assert_eq!(registry.active(), Some(&SessionId::from("s1")));
        }
    }

    mod delete {
        use super::*;

        #[test]
        fn removes_inactive_session() {
            let backend = ScriptedBackend::with_sessions(&["s1", "s2"]);
            let mut registry = SessionRegistry::new();
            registry.refresh(&backend).unwrap();
            registry.load(&backend, &SessionId::from("s1")).unwrap();

            let was_active = registry.delete(&backend, &SessionId::from("s2")).unwrap();

            assert!(!was_active);
            assert_eq!(ids(&registry), vec!["s1"]);
            assert_eq!(registry.active(), Some(&SessionId::from("s1")));
        }

        #[test]
        fn removing_active_clears_pointer() {
            let backend = ScriptedBackend::with_sessions(&["s1"]);
            let mut registry = SessionRegistry::new();
            registry.refresh(&backend).unwrap();
            registry.load(&backend, &SessionId::from("s1")).unwrap();

            let was_active = registry.delete(&backend, &SessionId::from("s1")).unwrap();

            assert!(was_active);
            assert!(registry.sessions().is_empty());
            assert!(registry.active().is_none());
        }

        #[test]
        fn failure_mutates_nothing() {
            let backend = ScriptedBackend::with_sessions(&["s1"]);
            let mut registry = SessionRegistry::new();
            registry.refresh(&backend).unwrap();
            registry.load(&backend, &SessionId::from("s1")).unwrap();

            backend.fail(Op::Delete);
            let result = registry.delete(&backend, &SessionId::from("s1"));

            assert!(matches!(result, Err(ChatError::SessionDelete { .. })));
            assert_eq!(ids(&registry), vec!["s1"]);
            assert_eq!(registry.active(), Some(&SessionId::from("s1")));
        }
    }
}
