pub mod home;
pub mod webhooks;
