//! Page handle backed by a bridge connection.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace, warn};

use crate::driver::Advance;
use crate::error::Result;
use crate::network::{Interceptor, Observation};

use super::connection::{Connection, DEFAULT_COMMAND_TIMEOUT, EventHandler, ReadyData};
use super::protocol::{AdvanceResult, Command, Event, PageInfo, ParsedEvent, Request};

// ============================================================================
// BridgePage
// ============================================================================

/// A host page connected through the bridge.
///
/// Implements [`Advance`] by sending `page.advance`, and feeds every
/// completed fetch reported by the page into its [`Interceptor`].
pub struct BridgePage {
    connection: Connection,
    ready: ReadyData,
    interceptor: Interceptor,
    /// Container override; `None` lets the script pick.
    selector: Option<String>,
    command_timeout: Duration,
}

impl fmt::Debug for BridgePage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgePage")
            .field("url", &self.ready.url)
            .field("selector", &self.selector)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BridgePage - Constructor
// ============================================================================

impl BridgePage {
    pub(crate) fn new(connection: Connection, ready: ReadyData, interceptor: Interceptor) -> Self {
        Self {
            connection,
            ready,
            interceptor,
            selector: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Builds the event handler that routes response events to
    /// `interceptor`.
    pub(crate) fn event_handler(interceptor: Interceptor) -> EventHandler {
        Box::new(move |event: Event| route_event(&interceptor, &event))
    }

    /// Scrolls the element matching `selector` instead of the automatically
    /// chosen container.
    #[inline]
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Sets the per-command timeout.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }
}

// ============================================================================
// BridgePage - Accessors
// ============================================================================

impl BridgePage {
    /// Returns the READY handshake data.
    #[inline]
    #[must_use]
    pub fn ready(&self) -> &ReadyData {
        &self.ready
    }

    /// Returns the interceptor fed by this page.
    #[inline]
    #[must_use]
    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Returns the underlying connection.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

// ============================================================================
// BridgePage - Commands
// ============================================================================

impl BridgePage {
    /// Scrolls the tracked container to its end.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`](crate::Error::Protocol) if the page reports an error
    /// - [`Error::RequestTimeout`](crate::Error::RequestTimeout) if it does not answer
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if it went away
    pub async fn scroll_to_end(&self) -> Result<AdvanceResult> {
        let command = Command::Advance {
            selector: self.selector.clone(),
        };
        let value = self.request(command).await?;

        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    /// Returns the page's current URL and title.
    ///
    /// # Errors
    ///
    /// Same as [`scroll_to_end`](Self::scroll_to_end).
    pub async fn info(&self) -> Result<PageInfo> {
        let value = self.request(Command::Info).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Closes the bridge connection.
    pub fn close(&self) {
        self.connection.shutdown();
    }

    async fn request(&self, command: Command) -> Result<serde_json::Value> {
        let response = self
            .connection
            .send_with_timeout(Request::new(command), self.command_timeout)
            .await?;

        response.into_result()
    }
}

#[async_trait]
impl Advance for BridgePage {
    async fn advance(&self) -> Result<()> {
        let result = self.scroll_to_end().await?;
        trace!(
            scroll_top = result.scroll_top,
            scroll_height = result.scroll_height,
            "Page advanced"
        );
        Ok(())
    }
}

// ============================================================================
// Event Routing
// ============================================================================

fn route_event(interceptor: &Interceptor, event: &Event) {
    let ParsedEvent::ResponseCompleted(completed) = event.parse() else {
        trace!(method = %event.method, "Unhandled bridge event");
        return;
    };

    // An undecodable body is handed on as empty so a matching request is
    // still counted.
    let body = completed.text().unwrap_or_else(|e| {
        warn!(url = %completed.url, error = %e, "Response body could not be decoded");
        String::new()
    });

    let observation = interceptor.observe(&completed.url, &body);
    if let Observation::Collected { new_keys, .. } = observation {
        debug!(url = %completed.url, status = completed.status, new_keys, "Bridge response observed");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{Value, json};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    use crate::bridge::BridgeServer;
    use crate::collector::Collector;
    use crate::error::Error;
    use crate::extract::ExtractionPolicy;

    const READY: &str = r#"{"id":"00000000-0000-0000-0000-000000000000","type":"success","result":{"url":"https://app.example/project/7","title":"Project"}}"#;

    fn workflows_event(keys: &[&str]) -> String {
        let media: Vec<Value> = keys
            .iter()
            .map(|k| {
                json!({
                    "mediaGenerationId": {"mediaKey": k},
                    "mediaData": {"imageData": {"fifeUri": format!("https://img/{k}")}}
                })
            })
            .collect();
        let body = json!({"result": {"data": {"json": {"result": {"workflows": [
            {"workflowSteps": [{"mediaGenerations": media}]}
        ]}}}}});

        json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "type": "event",
            "method": "network.responseCompleted",
            "params": {
                "url": "https://app.example/api/trpc/searchProjectWorkflows?batch=1",
                "status": 200,
                "body": body.to_string()
            }
        })
        .to_string()
    }

    /// Fake page: sends READY plus `events`, then answers commands until
    /// the socket closes. `page.advance` fails when `fail_advance` is set.
    async fn fake_page(ws_url: String, events: Vec<String>, fail_advance: bool) {
        let (mut ws, _) = connect_async(ws_url).await.expect("connect");
        ws.send(Message::Text(READY.into())).await.expect("ready");

        for event in events {
            ws.send(Message::Text(event.into())).await.expect("event");
        }

        while let Some(Ok(message)) = ws.next().await {
            let Message::Text(text) = message else {
                continue;
            };
            let request: Value = serde_json::from_str(&text).expect("request");
            let id = request["id"].clone();

            let reply = match request["method"].as_str() {
                Some("page.advance") if fail_advance => json!({
                    "id": id, "type": "error",
                    "error": "no such element", "message": "no scrollable container"
                }),
                Some("page.advance") => json!({
                    "id": id, "type": "success",
                    "result": {"scrollTop": 900, "scrollHeight": 1800}
                }),
                Some("page.info") => json!({
                    "id": id, "type": "success",
                    "result": {"url": "https://app.example/project/7", "title": "Project"}
                }),
                _ => json!({"id": id, "type": "error", "error": "unknown command"}),
            };

            if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                break;
            }
        }
    }

    async fn attach(events: Vec<String>, fail_advance: bool) -> BridgePage {
        let interceptor =
            Interceptor::new(ExtractionPolicy::default(), Arc::new(Collector::new()));
        interceptor.arm();

        let server = BridgeServer::bind_local().await.expect("bind");
        tokio::spawn(fake_page(server.ws_url(), events, fail_advance));

        server.attach(interceptor).await.expect("attach")
    }

    #[tokio::test]
    async fn test_attach_reads_ready_data() {
        let page = attach(Vec::new(), false).await;

        assert_eq!(page.ready().url, "https://app.example/project/7");
        assert_eq!(page.ready().title, "Project");
    }

    #[tokio::test]
    async fn test_response_events_feed_collector() {
        let page = attach(
            vec![workflows_event(&["k1", "k2"]), workflows_event(&["k2", "k3"])],
            false,
        )
        .await;

        // Events precede the reply on the same socket.
        page.info().await.expect("info");

        let collector = page.interceptor().collector();
        assert_eq!(collector.size(), 3);
        assert_eq!(collector.requests_observed(), 2);
        assert_eq!(collector.get("k3").as_deref(), Some("https://img/k3"));
    }

    #[tokio::test]
    async fn test_advance_round_trip() {
        let page = attach(Vec::new(), false).await;

        let result = page.scroll_to_end().await.expect("advance");
        assert_eq!(result.scroll_height, 1800.0);

        page.advance().await.expect("advance via trait");
        assert_eq!(page.connection().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_advance_error_is_protocol_error() {
        let page = attach(Vec::new(), true).await;

        let err = page.advance().await.unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(err.to_string().contains("no scrollable container"));
    }

    #[tokio::test]
    async fn test_closed_page_fails_commands() {
        let page = attach(Vec::new(), false).await;
        page.close();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let err = page.info().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[test]
    fn test_route_event_counts_undecodable_body() {
        let interceptor =
            Interceptor::new(ExtractionPolicy::default(), Arc::new(Collector::new()));
        interceptor.arm();

        let event: Event = serde_json::from_value(json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "type": "event",
            "method": "network.responseCompleted",
            "params": {
                "url": "https://app.example/searchProjectWorkflows",
                "status": 200,
                "body": "***",
                "encoding": "base64"
            }
        }))
        .expect("event");

        route_event(&interceptor, &event);

        assert_eq!(interceptor.collector().requests_observed(), 1);
        assert!(interceptor.collector().is_empty());
    }
}
