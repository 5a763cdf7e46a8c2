pub mod global_variables;
pub mod region_stats;
pub mod zonal_query;
