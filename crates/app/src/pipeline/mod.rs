//! The live detection-and-alerting pipeline: frame acquisition through the
//! stream pump, the detection ledger, alert throttling, and the HTTP API.

pub(crate) mod alerts;
pub(crate) mod annotate;
pub(crate) mod config;
pub(crate) mod control;
pub(crate) mod data;
pub(crate) mod ledger;
pub(crate) mod pump;
pub(crate) mod server;
pub(crate) mod telemetry;
