pub mod cart_item;
pub mod order;
pub mod order_detail;
pub mod order_product_detail;
pub mod pharmacy;
pub mod pharmacy_product;
pub mod product;
pub mod user_address;

pub use order_detail::OrderStatus;
