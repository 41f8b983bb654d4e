use crate::error::Error;
use crate::message::OutboundMessage;
use crate::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use url::Url;

/// Request used to open the socket
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionRequest {
    /// URL to connect to; interceptors may rewrite it (e.g. add query auth)
    pub url: Url,
    /// Sub-protocols advertised in `Sec-WebSocket-Protocol`
    pub sub_protocols: Vec<String>,
    /// Extra handshake headers
    pub headers: HeaderMap,
}

impl ConnectionRequest {
    pub fn new(url: Url, sub_protocols: Vec<String>) -> Self {
        Self {
            url,
            sub_protocols,
            headers: HeaderMap::new(),
        }
    }
}

/// Synchronous connection-request stage
pub trait ConnectionInterceptor: Send + Sync + 'static {
    fn intercept(&self, request: ConnectionRequest, endpoint: &Url) -> Result<ConnectionRequest>;
}

/// Synchronous outbound-message stage
pub trait MessageInterceptor: Send + Sync + 'static {
    fn intercept(&self, message: OutboundMessage, endpoint: &Url) -> Result<OutboundMessage>;
}

/// Connection-request stage that may suspend before completing
#[async_trait]
pub trait AsyncConnectionInterceptor: Send + Sync + 'static {
    async fn intercept(&self, request: ConnectionRequest, endpoint: &Url)
        -> Result<ConnectionRequest>;
}

/// Outbound-message stage that may suspend before completing
#[async_trait]
pub trait AsyncMessageInterceptor: Send + Sync + 'static {
    async fn intercept(&self, message: OutboundMessage, endpoint: &Url) -> Result<OutboundMessage>;
}

/// Result of running a value through a pipeline
pub enum Interception<T> {
    /// The pipeline completed inline
    Ready(Result<T>),
    /// The pipeline suspended; the future resolves to the rewritten value
    Pending(BoxFuture<'static, Result<T>>),
}

impl<T> std::fmt::Debug for Interception<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interception::Ready(_) => f.write_str("Interception::Ready"),
            Interception::Pending(_) => f.write_str("Interception::Pending"),
        }
    }
}

/// Strategy the provider uses to rewrite outbound values.
///
/// Interceptors rewrite the connection request (once per `connect`) and every
/// outbound message (at each `write`) before they reach the transport, e.g. to
/// sign them. A provider is built with exactly one pipeline flavour:
/// [`SyncInterceptors`], whose stages complete inline, or
/// [`AsyncInterceptors`], whose stages may suspend (for example while
/// refreshing credentials).
pub trait InterceptorPipeline: Send + Sync + 'static {
    /// Run the connection-request chain
    fn intercept_request(
        &self,
        request: ConnectionRequest,
        endpoint: &Url,
    ) -> Interception<ConnectionRequest>;

    /// Run the outbound-message chain
    fn intercept_message(
        &self,
        message: OutboundMessage,
        endpoint: &Url,
    ) -> Interception<OutboundMessage>;
}

/// Pipeline of stages that complete immediately
#[derive(Default)]
pub struct SyncInterceptors {
    connection: Vec<Box<dyn ConnectionInterceptor>>,
    message: Vec<Box<dyn MessageInterceptor>>,
}

impl SyncInterceptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection-request stage
    pub fn with_connection_interceptor(mut self, interceptor: impl ConnectionInterceptor) -> Self {
        self.connection.push(Box::new(interceptor));
        self
    }

    /// Append an outbound-message stage
    pub fn with_message_interceptor(mut self, interceptor: impl MessageInterceptor) -> Self {
        self.message.push(Box::new(interceptor));
        self
    }
}

impl InterceptorPipeline for SyncInterceptors {
    fn intercept_request(
        &self,
        request: ConnectionRequest,
        endpoint: &Url,
    ) -> Interception<ConnectionRequest> {
        let result = self
            .connection
            .iter()
            .try_fold(request, |request, stage| stage.intercept(request, endpoint));
        Interception::Ready(result)
    }

    fn intercept_message(
        &self,
        message: OutboundMessage,
        endpoint: &Url,
    ) -> Interception<OutboundMessage> {
        let result = self
            .message
            .iter()
            .try_fold(message, |message, stage| stage.intercept(message, endpoint));
        Interception::Ready(result)
    }
}

/// Pipeline of stages that may suspend
#[derive(Default)]
pub struct AsyncInterceptors {
    connection: Vec<Arc<dyn AsyncConnectionInterceptor>>,
    message: Vec<Arc<dyn AsyncMessageInterceptor>>,
}

impl AsyncInterceptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a connection-request stage
    pub fn with_connection_interceptor(
        mut self,
        interceptor: impl AsyncConnectionInterceptor,
    ) -> Self {
        self.connection.push(Arc::new(interceptor));
        self
    }

    /// Append an outbound-message stage
    pub fn with_message_interceptor(mut self, interceptor: impl AsyncMessageInterceptor) -> Self {
        self.message.push(Arc::new(interceptor));
        self
    }
}

impl InterceptorPipeline for AsyncInterceptors {
    fn intercept_request(
        &self,
        request: ConnectionRequest,
        endpoint: &Url,
    ) -> Interception<ConnectionRequest> {
        let chain = self.connection.clone();
        let endpoint = endpoint.clone();
        Interception::Pending(Box::pin(async move {
            let mut request = request;
            for stage in chain.iter() {
                request = stage.intercept(request, &endpoint).await?;
            }
            Ok(request)
        }))
    }

    fn intercept_message(
        &self,
        message: OutboundMessage,
        endpoint: &Url,
    ) -> Interception<OutboundMessage> {
        let chain = self.message.clone();
        let endpoint = endpoint.clone();
        Interception::Pending(Box::pin(async move {
            let mut message = message;
            for stage in chain.iter() {
                message = stage.intercept(message, &endpoint).await?;
            }
            Ok(message)
        }))
    }
}

/// Connection stage that adds fixed handshake headers (e.g. an API key)
#[derive(Debug, Clone, Default)]
pub struct HeaderInterceptor {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderInterceptor {
    pub fn new(headers: Vec<(HeaderName, HeaderValue)>) -> Self {
        Self { headers }
    }

    /// Build from string pairs, rejecting invalid names or values
    pub fn try_from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let headers = pairs
            .into_iter()
            .map(|(name, value)| {
                let name = HeaderName::try_from(name)
                    .map_err(|e| Error::Interceptor(format!("invalid header name '{}': {}", name, e)))?;
                let value = HeaderValue::try_from(value)
                    .map_err(|e| Error::Interceptor(format!("invalid header value: {}", e)))?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { headers })
    }
}

impl ConnectionInterceptor for HeaderInterceptor {
    fn intercept(&self, mut request: ConnectionRequest, _endpoint: &Url) -> Result<ConnectionRequest> {
        for (name, value) in &self.headers {
            request.headers.insert(name.clone(), value.clone());
        }
        Ok(request)
    }
}
