//! Impls - bundled adapters for the ports.
//!
//! - **InMemoryReportStore**: bounded log ring and report map
//! - **StaticAbilities**: ability list from configuration
//! - **HttpDelegationTransport**: delegation over the peer's REST surface

pub mod http_transport;
pub mod inmem_report_store;
pub mod static_abilities;

pub use self::http_transport::HttpDelegationTransport;
pub use self::inmem_report_store::InMemoryReportStore;
pub use self::static_abilities::StaticAbilities;
