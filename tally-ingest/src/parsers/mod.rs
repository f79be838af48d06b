pub mod capital_one;
pub mod notion_cash;
