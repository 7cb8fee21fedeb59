pub mod customer;
pub mod delivery;
pub mod delivery_line;
pub mod dispatch_record;
pub mod production_batch;
pub mod production_batch_input;
pub mod recall;
pub mod recall_affected_batch;
pub mod recall_notification;
pub mod stock_batch;
pub mod stock_item;
pub mod stock_movement;
pub mod supplier;
