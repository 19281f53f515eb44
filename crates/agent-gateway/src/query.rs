//! Query flow shared by the web handlers and the CLI.

use std::sync::Arc;

use agent_core::message::Message;
use agent_core::provider::GenerationOptions;
use agent_core::session::{NewSession, Session, SessionId, SessionStore};

use crate::connection::ConnectionManager;
use crate::error::{GatewayError, Result};

pub struct QueryService {
    sessions: Arc<SessionStore>,
    connections: Arc<ConnectionManager>,
}

impl QueryService {
    pub const fn new(sessions: Arc<SessionStore>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            sessions,
            connections,
        }
    }

    /// Connect to the session's endpoint, then open the session.
    ///
    /// No session is created when the endpoint is unreachable.
    pub async fn connect(&self, params: NewSession) -> Result<SessionId> {
        let handle = self.connections.ensure_connection(&params.endpoint).await?;
        tracing::info!(
            endpoint = %params.endpoint,
            model = %params.model_id,
            tools = handle.tool_names().len(),
            "Connected"
        );
        drop(handle);

        Ok(self.sessions.create(params).await)
    }

    /// Run `query` against the session's endpoint and record the exchange.
    ///
    /// A failed query leaves the session history untouched. Starting a query
    /// counts as activity, so the idle reaper does not race a running agent.
    pub async fn query(&self, session_id: &SessionId, query: &str) -> Result<String> {
        let session = self.sessions.touch(session_id).await?;

        let response = {
            let connection = self.connections.ensure_connection(&session.endpoint).await?;
            let agent = connection.agent();

            let mut conversation = agent.start_conversation();
            session.replay_into(&mut conversation);
            conversation.push(Message::user(query));

            let options = GenerationOptions {
                model: session.model_id.clone(),
                ..agent.config().generation.clone()
            };

            agent.run(&mut conversation, &options).await.map_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "Agent query failed");
                GatewayError::QueryFailed(e.to_string())
            })?
        };

        self.sessions
            .record_exchange(session_id, query, response.as_str())
            .await?;
        Ok(response)
    }

    pub async fn session(&self, session_id: &SessionId) -> Result<Session> {
        Ok(self.sessions.get(session_id).await?)
    }

    pub async fn cleanup(&self, session_id: &SessionId) -> Result<()> {
        self.sessions.remove(session_id).await?;
        tracing::info!(session_id = %session_id, "Session cleaned up");
        Ok(())
    }

    pub const fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub const fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }
}
