use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{Address, ErrorCode};

/// Stream of replies belonging to one [`BusRequest`].
pub type ReplyReceiver = mpsc::UnboundedReceiver<Value>;

/// One parsed RPC request.
///
/// A request owns the channel its replies travel on and a cancellation
/// token the transport trips when the calling client goes away. A plain
/// request receives exactly one reply; a subscribed request receives an
/// initial reply followed by any number of posts until the subscription
/// ends or the client disappears.
#[derive(Debug)]
pub struct BusRequest {
    category: String,
    method: String,
    payload: Value,
    subscribe: bool,
    sender: String,
    reply_tx: mpsc::UnboundedSender<Value>,
    client_gone: CancellationToken,
}

impl BusRequest {
    /// Creates a request and the receiving end of its reply stream.
    pub fn new(
        category: impl Into<String>,
        method: impl Into<String>,
        payload: Value,
        subscribe: bool,
        sender: impl Into<String>,
    ) -> (Self, ReplyReceiver) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let request = Self {
            category: category.into(),
            method: method.into(),
            payload,
            subscribe,
            sender: sender.into(),
            reply_tx,
            client_gone: CancellationToken::new(),
        };
        (request, reply_rx)
    }

    /// The category this request was addressed to, e.g. `/adapter`.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// The method name within the category.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The JSON parameters supplied by the caller.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Whether the caller asked for a subscription.
    pub fn is_subscription(&self) -> bool {
        self.subscribe
    }

    /// Identity of the calling client, as reported by the transport.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Token tripped by the transport when the calling client is gone.
    pub fn client_gone_token(&self) -> CancellationToken {
        self.client_gone.clone()
    }

    /// Whether the calling client is known to be gone.
    pub fn is_client_gone(&self) -> bool {
        self.client_gone.is_cancelled() || self.reply_tx.is_closed()
    }

    /// Sends a reply, reporting whether the client could still receive it.
    pub fn try_reply(&self, body: Value) -> bool {
        if self.client_gone.is_cancelled() {
            return false;
        }
        self.reply_tx.send(body).is_ok()
    }

    /// Sends a reply to the calling client.
    pub fn reply(&self, body: Value) {
        if !self.try_reply(body) {
            trace!(
                category = %self.category,
                method = %self.method,
                "dropping reply for disappeared client"
            );
        }
    }

    /// Replies with an error from the fixed wire table.
    pub fn reply_error(&self, code: ErrorCode) {
        self.reply(error_body(code));
    }

    /// Replies with an error that also terminates a subscription attempt.
    pub fn reply_error_subscribed(&self, code: ErrorCode) {
        let mut body = error_body(code);
        if let Some(object) = body.as_object_mut() {
            object.insert("subscribed".into(), Value::Bool(false));
        }
        self.reply(body);
    }
}

/// Builds the `{returnValue:false, errorCode, errorText}` error payload.
pub fn error_body(code: ErrorCode) -> Value {
    json!({
        "returnValue": false,
        "errorCode": code.code(),
        "errorText": code.text(),
    })
}

/// Scope metadata attached to a [`ClientWatch`] so fan-out logic can
/// filter watches by caller scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchContext {
    /// Adapter the watch was installed for.
    pub adapter_address: Option<Address>,
    /// Device the watch was installed for, if device-scoped.
    pub device_address: Option<Address>,
    /// LE scan id the watch was installed for, if scan-scoped.
    pub scan_id: Option<u32>,
    /// MAP session key (`<deviceAddress>_<instanceName>`), if session-scoped.
    pub session_key: Option<String>,
}

impl WatchContext {
    /// Context scoped to a whole adapter.
    pub fn adapter(address: Address) -> Self {
        Self {
            adapter_address: Some(address),
            ..Self::default()
        }
    }

    /// Context scoped to one device on one adapter.
    pub fn device(adapter: Address, device: Address) -> Self {
        Self {
            adapter_address: Some(adapter),
            device_address: Some(device),
            ..Self::default()
        }
    }

    /// Context scoped to one LE scan on one adapter.
    pub fn scan(adapter: Address, scan_id: u32) -> Self {
        Self {
            adapter_address: Some(adapter),
            scan_id: Some(scan_id),
            ..Self::default()
        }
    }
}

/// Binds a subscribed request to a client-disappearance callback.
///
/// The callback fires at most once, when the transport reports the
/// calling client gone. Dropping the watch releases the message and
/// guarantees the callback can no longer fire; dropping it from inside
/// the callback is safe.
#[derive(Debug)]
pub struct ClientWatch {
    request: BusRequest,
    context: WatchContext,
    waiter: JoinHandle<()>,
}

impl ClientWatch {
    /// Installs a watch over `request`.
    pub fn new(
        request: BusRequest,
        context: WatchContext,
        on_client_gone: impl FnOnce() + Send + 'static,
    ) -> Self {
        let token = request.client_gone_token();
        let waiter = tokio::spawn(async move {
            token.cancelled().await;
            on_client_gone();
        });
        Self {
            request,
            context,
            waiter,
        }
    }

    /// The request this watch keeps alive.
    pub fn request(&self) -> &BusRequest {
        &self.request
    }

    /// The caller scope of this watch.
    pub fn context(&self) -> &WatchContext {
        &self.context
    }

    /// Posts an event to the watching client.
    pub fn post(&self, body: Value) {
        self.request.reply(body);
    }

    /// Whether the watching client has disappeared.
    pub fn is_client_gone(&self) -> bool {
        self.request.is_client_gone()
    }
}

impl Drop for ClientWatch {
    fn drop(&mut self) {
        self.waiter.abort();
    }
}

/// Multi-subscriber fan-out endpoint.
///
/// Subscribers receive posts in the order they joined; clients that have
/// gone away are pruned lazily on the next post.
#[derive(Debug, Default)]
pub struct SubscriptionPoint {
    subscribers: Vec<BusRequest>,
}

impl SubscriptionPoint {
    /// Creates an empty subscription point.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a caller to the fan-out list.
    pub fn subscribe(&mut self, request: BusRequest) {
        self.subscribers.push(request);
    }

    /// Posts a JSON body to every live subscriber.
    pub fn post(&mut self, body: &Value) {
        self.subscribers
            .retain(|subscriber| subscriber.try_reply(body.clone()));
    }

    /// Number of currently tracked subscribers.
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether no subscriber is tracked.
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(subscribe: bool) -> (BusRequest, ReplyReceiver) {
        BusRequest::new("/adapter", "getStatus", json!({}), subscribe, "test-client")
    }

    #[tokio::test]
    async fn reply_reaches_the_caller() {
        let (request, mut replies) = request(false);
        request.reply(json!({"returnValue": true}));
        let body = replies.recv().await.expect("reply");
        assert_eq!(body["returnValue"], json!(true));
    }

    #[tokio::test]
    async fn error_reply_carries_code_and_text() {
        let (request, mut replies) = request(false);
        request.reply_error(ErrorCode::AdapterNotAvailable);
        let body = replies.recv().await.expect("reply");
        assert_eq!(body["returnValue"], json!(false));
        assert_eq!(body["errorCode"], json!(101));
        assert!(body["errorText"].is_string());
    }

    #[tokio::test]
    async fn subscription_point_prunes_dead_subscribers() {
        let mut point = SubscriptionPoint::new();
        let (first, mut first_rx) = request(true);
        let (second, second_rx) = request(true);
        point.subscribe(first);
        point.subscribe(second);
        drop(second_rx);

        point.post(&json!({"n": 1}));
        assert_eq!(point.len(), 1);
        assert_eq!(first_rx.recv().await.expect("post")["n"], json!(1));
    }

    #[tokio::test]
    async fn watch_fires_once_on_client_disappearance() {
        let (request, _replies) = request(true);
        let token = request.client_gone_token();
        let (fired_tx, mut fired_rx) = mpsc::unbounded_channel();
        let _watch = ClientWatch::new(request, WatchContext::default(), move || {
            let _ = fired_tx.send(());
        });

        token.cancel();
        fired_rx.recv().await.expect("callback fired");
        assert!(fired_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_watch_never_fires() {
        let (request, _replies) = request(true);
        let token = request.client_gone_token();
        let (fired_tx, mut fired_rx) = mpsc::unbounded_channel::<()>();
        let watch = ClientWatch::new(request, WatchContext::default(), move || {
            let _ = fired_tx.send(());
        });

        drop(watch);
        token.cancel();
        tokio::task::yield_now().await;
        assert!(fired_rx.try_recv().is_err());
    }
}
