//! Task trait - binds a `task_type` string to a typed payload.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Task ties a `task_type` to the payload type its executor receives.
///
/// # Example
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct MarketScan {
///     region: String,
/// }
///
/// impl Task for MarketScan {
///     const TYPE: &'static str = "research.market_scan.v1";
/// }
/// ```
///
/// # Naming
/// - `{namespace}.{action}.v{major}`
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;

    /// Shown in the capability listing.
    const DESCRIPTION: &'static str = "";
}
