use std::env;

pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Replay-protection window for the webhook signature timestamp, in seconds.
    pub tolerance_seconds: i64,
}

pub struct DirectusSettings {
    pub base_url: String,
    pub access_token: String,
}

pub struct Config {
    pub stripe: StripeSettings,
    pub directus: DirectusSettings,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let secret_key = env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set");
        let webhook_secret =
            env::var("STRIPE_WEBHOOK_SECRET").expect("STRIPE_WEBHOOK_SECRET must be set");
        let tolerance_seconds = env::var("STRIPE_TOLERANCE_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(300);

        let base_url = env::var("DIRECTUS_URL").expect("DIRECTUS_URL must be set");
        let access_token = env::var("DIRECTUS_TOKEN").expect("DIRECTUS_TOKEN must be set");

        let port = env::var("PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(3000);

        Config {
            stripe: StripeSettings {
                secret_key,
                webhook_secret,
                tolerance_seconds,
            },
            directus: DirectusSettings {
                base_url,
                access_token,
            },
            port,
        }
    }
}
