pub use wirechat_tokio_transport::{
    TokioWebSocketTransport, TokioWebSocketTransportFactory, Transport, TransportEvent,
    TransportFactory,
};
