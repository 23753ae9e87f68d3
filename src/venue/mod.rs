//! Venue adapters: REST discovery and orderbook clients, the WebSocket
//! trade feed, and the shared rate-limiting/breaker plumbing.

pub mod breaker;
pub mod discovery;
pub mod dto;
pub mod http;
pub mod orderbook;
pub mod rate_limit;
pub mod stream;
pub mod traits;

pub use breaker::CircuitBreaker;
pub use discovery::DiscoveryClient;
pub use orderbook::OrderbookClient;
pub use rate_limit::TokenBucket;
pub use stream::{ReconnectingStream, VenueTradeStream};
pub use traits::{MarketDescriptor, MarketDiscovery, OrderbookSource, StreamEvent, TradeStream};
