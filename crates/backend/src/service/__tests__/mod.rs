
mod freshness;
mod sync_flow;
