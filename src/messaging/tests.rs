#[cfg(test)]
mod tests {
    use super::super::client::{ClientMessage, ClientTransport, SessionId, Toast, ToastIcon};
    use super::super::feed::UpstreamFeed;
    use super::super::router::Router;
    use super::super::topics;
    use crate::handlers::Handler;
    use anyhow::Result;
    use async_trait::async_trait;
    use futures::future::BoxFuture;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    // Records everything the router hands it
    struct Recorder {
        name: &'static str,
        seen: mpsc::UnboundedSender<(String, Value, Option<SessionId>)>,
        closed: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Handler for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn client_topics(&self) -> &'static [&'static str] {
            &[topics::GET_EVENT_HISTORY]
        }

        fn wants_disconnects(&self) -> bool {
            true
        }

        async fn on_client_message(&self, topic: &str, data: Value, session: SessionId) -> Result<()> {
            self.seen.send((topic.to_string(), data, Some(session))).ok();
            Ok(())
        }

        async fn on_client_disconnect(&self, session: SessionId) {
            self.seen
                .send(("disconnect".to_string(), Value::Null, Some(session)))
                .ok();
        }

        async fn close(&self) -> Result<()> {
            self.closed.lock().unwrap().push(self.name);
            Ok(())
        }
    }

    fn recorder(
        name: &'static str,
        closed: &Arc<Mutex<Vec<&'static str>>>,
    ) -> (Arc<dyn Handler>, mpsc::UnboundedReceiver<(String, Value, Option<SessionId>)>) {
        let (seen, rx) = mpsc::unbounded_channel();
        let handler: Arc<dyn Handler> = Arc::new(Recorder {
            name,
            seen,
            closed: closed.clone(),
        });
        (handler, rx)
    }

    async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("message in time")
            .expect("channel open")
    }

    #[tokio::test]
    async fn test_unicast_reaches_only_target() {
        let transport = ClientTransport::new();
        let (a, mut rx_a) = transport.connect(None).await;
        let (_b, mut rx_b) = transport.connect(None).await;

        transport
            .publish(topics::EVENT_HISTORY, &json!([1, 2]), Some(a))
            .await
            .unwrap();

        assert_eq!(
            next(&mut rx_a).await,
            ClientMessage {
                event: topics::EVENT_HISTORY.to_string(),
                data: json!([1, 2])
            }
        );
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_session() {
        let transport = ClientTransport::new();
        let (_a, mut rx_a) = transport.connect(None).await;
        let (_b, mut rx_b) = transport.connect(None).await;

        transport.toast(ToastIcon::Info, "New event in processing", None).await;

        for rx in [&mut rx_a, &mut rx_b] {
            let message = next(rx).await;
            assert_eq!(message.event, topics::TOAST);
            let toast: Toast = serde_json::from_value(message.data).unwrap();
            assert_eq!(toast.icon, ToastIcon::Info);
            assert_eq!(toast.title, "New event in processing");
        }
    }

    #[tokio::test]
    async fn test_publish_to_departed_session_is_not_an_error() {
        let transport = ClientTransport::new();
        let (a, rx_a) = transport.connect(None).await;
        drop(rx_a);

        assert!(transport.publish(topics::HEARTBEAT, &json!({}), Some(a)).await.is_ok());
        assert!(transport
            .publish(topics::HEARTBEAT, &json!({}), Some(uuid::Uuid::new_v4()))
            .await
            .is_ok());
        assert!(transport.publish(topics::HEARTBEAT, &json!({}), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_runs_each_subscriber() {
        let transport = ClientTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..2 {
            let tx = tx.clone();
            transport
                .on(
                    topics::GET_EVENT_LIST,
                    Arc::new(move |data: Value, session: SessionId| -> BoxFuture<'static, Result<()>> {
                        let tx = tx.clone();
                        Box::pin(async move {
                            tx.send((data, session)).ok();
                            Ok(())
                        })
                    }),
                )
                .await;
        }

        let (session, _rx) = transport.connect(None).await;
        transport.dispatch(session, topics::GET_EVENT_LIST, json!({"pageNumber": 0})).await;
        transport.dispatch(session, "unknown-topic", json!(null)).await;

        assert_eq!(next(&mut rx).await, (json!({"pageNumber": 0}), session));
        assert_eq!(next(&mut rx).await, (json!({"pageNumber": 0}), session));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_router_routes_messages_and_disconnects() {
        let transport = Arc::new(ClientTransport::new());
        let closed = Arc::new(Mutex::new(Vec::new()));
        let (handler, mut seen) = recorder("recorder", &closed);
        let router = Router::with_handlers(transport.clone(), UpstreamFeed::new("not-an-endpoint"), vec![handler]);
        router.start().await.unwrap();

        let (session, _rx) = transport.connect(None).await;
        transport.dispatch(session, topics::GET_EVENT_HISTORY, json!("id")).await;
        let (topic, data, from) = next(&mut seen).await;
        assert_eq!(topic, topics::GET_EVENT_HISTORY);
        assert_eq!(data, json!("id"));
        assert_eq!(from, Some(session));

        transport.disconnect(session).await;
        let (topic, _, from) = next(&mut seen).await;
        assert_eq!(topic, "disconnect");
        assert_eq!(from, Some(session));
        assert_eq!(transport.session_count().await, 0);

        router.close().await;
    }

    #[tokio::test]
    async fn test_router_closes_handlers_in_table_order() {
        let transport = Arc::new(ClientTransport::new());
        let closed = Arc::new(Mutex::new(Vec::new()));
        let (first, _seen_first) = recorder("first", &closed);
        let (second, _seen_second) = recorder("second", &closed);
        let router = Router::with_handlers(
            transport.clone(),
            UpstreamFeed::new("not-an-endpoint"),
            vec![first, second],
        );
        router.start().await.unwrap();

        router.close().await;
        assert_eq!(*closed.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_router_starts_while_publisher_is_down() {
        let transport = Arc::new(ClientTransport::new());
        let closed = Arc::new(Mutex::new(Vec::new()));
        let (handler, _seen) = recorder("recorder", &closed);
        let router = Router::with_handlers(
            transport.clone(),
            UpstreamFeed::new("tcp://127.0.0.1:1"),
            vec![handler],
        );

        tokio::time::timeout(Duration::from_secs(1), router.start())
            .await
            .expect("start does not wait for the feed")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), router.close())
            .await
            .expect("close while the feed is still connecting");
        assert_eq!(*closed.lock().unwrap(), vec!["recorder"]);
    }
}
