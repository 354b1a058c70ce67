use crate::config::Config;
use crate::records::RecordGateway;
use crate::services::stripe::StripeService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub records: Arc<dyn RecordGateway>,
    pub stripe: Arc<dyn StripeService>,
    pub config: Arc<Config>,
}
