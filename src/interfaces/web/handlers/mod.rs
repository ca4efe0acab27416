pub mod callbacks;
pub mod health;
pub mod webhooks;
