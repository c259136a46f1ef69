//! Dispatch of parsed segments to role endpoints
//!
//! Segments are handled strictly left to right. For each one the user text
//! is appended first, then every targeted role is called concurrently
//! against the same history snapshot. Each reply (or error marker) is
//! appended the moment it arrives, so a later segment sees it as context.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::context;
use crate::error::DispatchError;
use crate::providers::{ModelEndpoint, NormalizedReply, ResponseNormalizer};
use crate::roles::{Role, RoleRegistry};
use crate::transcript::ConversationStore;
use crate::types::{MentionSegment, NewEntry, TranscriptEntry};

/// Per-dispatch limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Deadline for one role's call, retries included
    pub timeout: Duration,
    /// Most recent entries sent as context (0 sends everything)
    pub context_window: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            context_window: 100,
        }
    }
}

/// Text of the error entry shown when a role fails
pub fn error_text(role_id: &str, err: &DispatchError) -> String {
    format!("Error getting response from {}: {}", role_id, err)
}

/// Sends segments to their roles and records the results
pub struct Dispatcher {
    endpoint: Arc<dyn ModelEndpoint>,
    config: DispatchConfig,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(endpoint: Arc<dyn ModelEndpoint>, config: DispatchConfig) -> Self {
        Self { endpoint, config }
    }

    /// Dispatch every segment of one input line. Returns the entries this
    /// line appended, in sequence order. Never fails: endpoint problems
    /// become error entries, and a reset mid-line drops the remainder.
    pub async fn dispatch(
        &self,
        segments: &[MentionSegment],
        registry: &RoleRegistry,
        store: &ConversationStore,
    ) -> Vec<Arc<TranscriptEntry>> {
        let generation = store.generation();
        let mut appended = Vec::new();

        for segment in segments {
            let roles: Vec<Arc<Role>> = segment
                .roles
                .iter()
                .filter_map(|id| {
                    let role = registry.resolve(id);
                    if role.is_none() {
                        warn!("Segment targets unknown role '{}', skipping it", id);
                    }
                    role
                })
                .collect();

            if !segment.text.is_empty() {
                let entry = NewEntry::user(segment.text.clone(), segment.roles.clone());
                match store.append_in(generation, entry) {
                    Ok(e) => appended.push(e),
                    Err(e) => {
                        debug!("Dropping rest of line: {}", e);
                        break;
                    }
                }
            }

            let snapshot = store.snapshot();
            if snapshot.generation() != generation {
                debug!("Store was reset mid-line, dropping remaining segments");
                break;
            }

            let calls = roles.iter().map(|role| {
                let history = snapshot.entries();
                async move {
                    let entry = match self.call_role(role, history).await {
                        Ok(reply) => {
                            info!(
                                "{} replied ({} chars, {} citations)",
                                role.id,
                                reply.text.len(),
                                reply.citations.len()
                            );
                            NewEntry::reply(role.id.clone(), reply.text, reply.citations)
                        }
                        Err(e) => {
                            warn!("{} failed: {}", role.id, e);
                            NewEntry::error(role.id.clone(), error_text(&role.id, &e))
                        }
                    };
                    match store.append_in(generation, entry) {
                        Ok(e) => Some(e),
                        Err(e) => {
                            debug!("Discarding result from {}: {}", role.id, e);
                            None
                        }
                    }
                }
            });
            appended.extend(join_all(calls).await.into_iter().flatten());
        }

        appended.sort_by_key(|e| e.seq);
        appended
    }

    /// Call one role against `history` under the dispatch deadline
    async fn call_role(
        &self,
        role: &Role,
        history: &[Arc<TranscriptEntry>],
    ) -> Result<NormalizedReply, DispatchError> {
        let request = context::build_request(role, history, self.config.context_window);

        let raw = match tokio::time::timeout(
            self.config.timeout,
            self.endpoint.complete(role, &request),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(DispatchError::Endpoint(e)),
            Err(_) => return Err(DispatchError::Timeout(self.config.timeout)),
        };

        ResponseNormalizer::for_provider(role.provider).normalize(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChatRequest;
    use crate::roles::ModelParams;
    use crate::types::Speaker;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// How a scripted role behaves
    #[derive(Clone)]
    enum Script {
        Reply { text: &'static str, delay_ms: u64 },
        Fail(&'static str),
        Hang,
    }

    /// Mock endpoint that answers per role and records every request
    struct ScriptedEndpoint {
        scripts: HashMap<String, Script>,
        requests: Mutex<Vec<(String, ChatRequest)>>,
    }

    impl ScriptedEndpoint {
        fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .iter()
                    .map(|(id, s)| (id.to_string(), s.clone()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests_for(&self, role: &str) -> Vec<ChatRequest> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|(r, _)| r == role)
                .map(|(_, req)| req.clone())
                .collect()
        }
    }

    #[async_trait]
    impl ModelEndpoint for ScriptedEndpoint {
        async fn complete(&self, role: &Role, request: &ChatRequest) -> Result<Value> {
            self.requests
                .lock()
                .unwrap()
                .push((role.id.clone(), request.clone()));
            match self.scripts.get(&role.id).cloned() {
                Some(Script::Reply { text, delay_ms }) => {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(json!({"choices": [{"message": {"content": text}}]}))
                }
                Some(Script::Fail(msg)) => Err(anyhow!(msg)),
                Some(Script::Hang) => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Err(anyhow!("unreachable"))
                }
                None => Err(anyhow!("no script for {}", role.id)),
            }
        }
    }

    fn registry() -> RoleRegistry {
        let roles = ["Default", "Tech", "Creative"]
            .iter()
            .map(|id| Role::new(*id, format!("You are {}.", id), ModelParams::new("gpt-4o")))
            .collect();
        RoleRegistry::new(roles, "Default").unwrap()
    }

    fn dispatcher(endpoint: Arc<ScriptedEndpoint>) -> Dispatcher {
        Dispatcher::new(
            endpoint,
            DispatchConfig {
                timeout: Duration::from_millis(200),
                context_window: 0,
            },
        )
    }

    fn seg(roles: &[&str], text: &str) -> MentionSegment {
        MentionSegment::new(roles.iter().map(|r| r.to_string()).collect(), text)
    }

    fn reply(text: &'static str) -> Script {
        Script::Reply { text, delay_ms: 0 }
    }

    #[tokio::test]
    async fn test_single_segment_appends_user_then_reply() {
        let endpoint = ScriptedEndpoint::new(&[("Tech", reply("use an index"))]);
        let reg = registry();
        let store = ConversationStore::new(reg.all_ids());

        let entries = dispatcher(endpoint.clone())
            .dispatch(&[seg(&["Tech"], "slow query?")], &reg, &store)
            .await;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].speaker, Speaker::User);
        assert_eq!(entries[0].addressed_to, vec!["Tech"]);
        assert_eq!(entries[1].speaker, Speaker::Role("Tech".into()));
        assert_eq!(entries[1].text, "use an index");

        let req = &endpoint.requests_for("Tech")[0];
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].content, "[To Tech] slow query?");
        assert_eq!(req.system[0], "You are Tech.");
    }

    #[tokio::test]
    async fn test_cluster_shares_snapshot_and_both_follow_user_entry() {
        let endpoint = ScriptedEndpoint::new(&[
            ("Tech", Script::Reply { text: "slow answer", delay_ms: 80 }),
            ("Creative", Script::Reply { text: "fast answer", delay_ms: 0 }),
        ]);
        let reg = registry();
        let store = ConversationStore::new(reg.all_ids());

        let entries = dispatcher(endpoint.clone())
            .dispatch(&[seg(&["Tech", "Creative"], "describe the internet")], &reg, &store)
            .await;

        assert_eq!(entries.len(), 3);
        assert!(entries[0].speaker.is_user());
        assert!(entries[1..].iter().all(|e| !e.speaker.is_user()));
        // Replies land in completion order
        assert_eq!(entries[1].text, "fast answer");
        assert_eq!(entries[2].text, "slow answer");

        // Neither saw the other's reply
        assert_eq!(endpoint.requests_for("Tech")[0].messages.len(), 1);
        assert_eq!(endpoint.requests_for("Creative")[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_later_segment_sees_earlier_reply() {
        let endpoint = ScriptedEndpoint::new(&[
            ("Tech", reply("B-trees")),
            ("Creative", reply("once upon a table")),
        ]);
        let reg = registry();
        let store = ConversationStore::new(reg.all_ids());

        let entries = dispatcher(endpoint.clone())
            .dispatch(
                &[
                    seg(&["Tech"], "explain how databases work."),
                    seg(&["Creative"], "write a story about a database."),
                ],
                &reg,
                &store,
            )
            .await;

        let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);

        let creative = &endpoint.requests_for("Creative")[0];
        let contents: Vec<&str> = creative.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![
                "[To Tech] explain how databases work.",
                "[Tech] B-trees",
                "[To Creative] write a story about a database.",
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_becomes_error_entry_without_blocking_sibling() {
        let endpoint = ScriptedEndpoint::new(&[
            ("Tech", Script::Fail("status 401 Unauthorized")),
            ("Creative", reply("still here")),
        ]);
        let reg = registry();
        let store = ConversationStore::new(reg.all_ids());

        let entries = dispatcher(endpoint)
            .dispatch(&[seg(&["Tech", "Creative"], "hi")], &reg, &store)
            .await;

        assert_eq!(entries.len(), 3);
        let tech = entries.iter().find(|e| e.speaker.is_role("Tech")).unwrap();
        assert!(tech.is_error());
        assert_eq!(
            tech.text,
            "Error getting response from Tech: status 401 Unauthorized"
        );
        let creative = entries.iter().find(|e| e.speaker.is_role("Creative")).unwrap();
        assert_eq!(creative.text, "still here");
    }

    #[tokio::test]
    async fn test_timeout_is_an_error_entry() {
        let endpoint = ScriptedEndpoint::new(&[
            ("Tech", Script::Hang),
            ("Creative", reply("on time")),
        ]);
        let reg = registry();
        let store = ConversationStore::new(reg.all_ids());

        let entries = dispatcher(endpoint)
            .dispatch(&[seg(&["Tech", "Creative"], "quick")], &reg, &store)
            .await;

        let tech = entries.iter().find(|e| e.speaker.is_role("Tech")).unwrap();
        assert!(tech.is_error());
        assert!(tech.text.contains("timed out"));
        assert!(entries.iter().any(|e| e.text == "on time"));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_an_error_entry() {
        struct Garbage;
        #[async_trait]
        impl ModelEndpoint for Garbage {
            async fn complete(&self, _role: &Role, _request: &ChatRequest) -> Result<Value> {
                Ok(json!({"unexpected": true}))
            }
        }
        let reg = registry();
        let store = ConversationStore::new(reg.all_ids());
        let d = Dispatcher::new(Arc::new(Garbage), DispatchConfig::default());

        let entries = d.dispatch(&[seg(&["Default"], "hi")], &reg, &store).await;
        assert_eq!(entries.len(), 2);
        assert!(entries[1].is_error());
        assert!(entries[1].text.starts_with("Error getting response from Default:"));
    }

    #[tokio::test]
    async fn test_empty_body_skips_user_entry() {
        let endpoint = ScriptedEndpoint::new(&[("Tech", reply("continuing"))]);
        let reg = registry();
        let store = ConversationStore::new(reg.all_ids());
        store
            .append(NewEntry::user("earlier question", vec!["Tech".into()]))
            .unwrap();

        let entries = dispatcher(endpoint.clone())
            .dispatch(&[seg(&["Tech"], "")], &reg, &store)
            .await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].seq, 1);
        assert_eq!(endpoint.requests_for("Tech")[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_reset_during_dispatch_discards_late_reply() {
        let endpoint = ScriptedEndpoint::new(&[(
            "Tech",
            Script::Reply { text: "late", delay_ms: 100 },
        )]);
        let reg = Arc::new(registry());
        let store = Arc::new(ConversationStore::new(reg.all_ids()));
        let d = Arc::new(dispatcher(endpoint));

        let task = {
            let (reg, store, d) = (reg.clone(), store.clone(), d.clone());
            tokio::spawn(async move {
                d.dispatch(&[seg(&["Tech"], "question")], &reg, &store).await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        store.reset();

        let entries = task.await.unwrap();
        assert_eq!(entries.len(), 1, "only the user entry from before the reset");
        assert!(store.is_empty());
    }

    #[test]
    fn test_error_text() {
        let err = DispatchError::Timeout(Duration::from_secs(120));
        assert_eq!(
            error_text("Tech", &err),
            "Error getting response from Tech: request timed out after 120s"
        );
    }
}
