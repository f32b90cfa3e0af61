//! Background tasks bridging a WebSocket stream to a [`Link`](crate::transport::Link).

pub(crate) mod read;
pub(crate) mod write;
