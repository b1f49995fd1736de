pub mod api_front;
pub mod compute;
pub mod firewall;
pub mod network;
pub mod warehouse;

pub use api_front::ApiFront;
pub use compute::ComputeFunction;
pub use firewall::PerimeterFirewall;
pub use network::NetworkFoundation;
pub use warehouse::AnalyticsWarehouse;

use crate::core::assembler::Assembler;
use crate::domain::ports::Unit;

pub const NETWORK_FOUNDATION: &str = "NetworkFoundation";
pub const ANALYTICS_WAREHOUSE: &str = "AnalyticsWarehouse";
pub const COMPUTE_FUNCTION: &str = "ComputeFunction";
pub const API_FRONT: &str = "ApiFront";
pub const PERIMETER_FIREWALL: &str = "PerimeterFirewall";

/// Slot names shared between producers and consumers.
pub mod slots {
    pub const NETWORK: &str = "network";
    pub const SECURITY_GROUP: &str = "security_group";
    pub const WAREHOUSE_NAMESPACE: &str = "warehouse_namespace";
    pub const WAREHOUSE_WORKGROUP: &str = "warehouse_workgroup";
    pub const DATABASE_NAME: &str = "database_name";
    pub const PREDICTION_FUNCTION: &str = "prediction_function";
    pub const REST_API: &str = "rest_api";
}

pub fn default_units() -> Vec<Box<dyn Unit>> {
    vec![
        Box::new(NetworkFoundation::new()),
        Box::new(AnalyticsWarehouse::new()),
        Box::new(ComputeFunction::new()),
        Box::new(ApiFront::new()),
        Box::new(PerimeterFirewall::new()),
    ]
}

/// Assembler preloaded with the five units of the prediction service.
pub fn default_assembler() -> Assembler {
    default_units()
        .into_iter()
        .fold(Assembler::new(), |assembler, unit| assembler.with_unit(unit))
}
