pub mod paper;
pub mod webhook;

pub use paper::{PaperGateway, RandomWalkFeed, StaticPriceFeed};
pub use webhook::WebhookNotifier;
