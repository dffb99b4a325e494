pub mod bom_line;
pub mod bom_version;
pub mod component;
pub mod finished_goods_balance;
pub mod finished_goods_line;
pub mod inventory_balance;
pub mod ledger_entry;
pub mod ledger_line;
pub mod location;
pub mod lot;
pub mod sku;
