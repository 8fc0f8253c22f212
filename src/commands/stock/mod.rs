pub mod adjust_stock_command;
pub mod void_movement_command;

pub use adjust_stock_command::AdjustStockCommand;
pub use void_movement_command::VoidMovementCommand;
