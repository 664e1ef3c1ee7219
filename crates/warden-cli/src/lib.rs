pub mod fshost;
pub mod output;
