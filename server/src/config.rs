//! Server configuration.
//!
//! Every flag can also be set through the environment (and a `.env` file,
//! loaded before parsing). [`Settings`] is the subset handlers read at
//! request time; it has test-friendly defaults.

use clap::Parser;
use pulse_scraper::ScraperArgs;
use std::net::SocketAddr;

#[derive(Parser, Debug, Clone)]
#[command(name = "dealsprints-server")]
#[command(about = "DealSprints marketing site, OKC Pulse feed and API")]
#[command(version)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    #[arg(
        long,
        env = "DATABASE_URL",
        hide_env_values = true,
        required_unless_present = "memory"
    )]
    pub database_url: Option<String>,

    /// Keep all data in process memory instead of Postgres (development only)
    #[arg(long)]
    pub memory: bool,

    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value = "10")]
    pub database_max_connections: u32,

    /// Public origin used to build checkout return URLs
    #[arg(long, env = "SITE_URL", default_value = "http://localhost:3000")]
    pub site_url: String,

    /// HS256 secret that signs Supabase access tokens
    #[arg(long, env = "SUPABASE_JWT_SECRET", hide_env_values = true)]
    pub supabase_jwt_secret: String,

    /// Emails allowed into the admin endpoints
    #[arg(long, env = "ADMIN_EMAILS", value_delimiter = ',', default_value = "")]
    pub admin_emails: Vec<String>,

    /// Bearer token accepted by the scraper cron endpoint
    #[arg(long, env = "CRON_SECRET", hide_env_values = true)]
    pub cron_secret: Option<String>,

    /// Secret for on-demand page revalidation
    #[arg(long, env = "REVALIDATE_SECRET", hide_env_values = true)]
    pub revalidate_secret: Option<String>,

    #[command(flatten)]
    pub stripe: StripeArgs,

    #[command(flatten)]
    pub limits: LimitArgs,

    #[command(flatten)]
    pub scraper: ScraperArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct StripeArgs {
    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: Option<String>,

    #[arg(long, env = "STRIPE_WEBHOOK_SECRET", hide_env_values = true)]
    pub stripe_webhook_secret: Option<String>,

    /// Price for the member plan
    #[arg(long, env = "STRIPE_PRICE_ID")]
    pub stripe_price_id: Option<String>,

    /// Price for the realtor plan
    #[arg(long, env = "STRIPE_REALTOR_PRICE_ID")]
    pub stripe_realtor_price_id: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct LimitArgs {
    /// Feed posts shown to free and anonymous visitors
    #[arg(long, env = "FREE_POST_LIMIT", default_value = "5")]
    pub free_post_limit: i64,

    /// Feed posts shown to paying members
    #[arg(long, env = "MEMBER_POST_LIMIT", default_value = "100")]
    pub member_post_limit: i64,

    /// How far back the public feed reaches
    #[arg(long, env = "FEED_WINDOW_DAYS", default_value = "30")]
    pub feed_window_days: i64,

    /// How far back realtor leads reach
    #[arg(long, env = "LEADS_WINDOW_DAYS", default_value = "30")]
    pub leads_window_days: i64,

    /// Analyze requests allowed per client IP per window
    #[arg(long, env = "ANALYZE_RATE_LIMIT", default_value = "5")]
    pub analyze_rate_limit: u32,

    #[arg(long, env = "ANALYZE_RATE_WINDOW_SECS", default_value = "3600")]
    pub analyze_rate_window_secs: i64,

    /// Lifetime of cached anonymous page renders
    #[arg(long, env = "PAGE_CACHE_TTL_SECS", default_value = "300")]
    pub page_cache_ttl_secs: u64,
}

/// Values handlers consult per request.
#[derive(Debug, Clone)]
pub struct Settings {
    pub site_url: String,
    pub admin_emails: Vec<String>,
    pub cron_secret: Option<String>,
    pub revalidate_secret: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub member_price_id: Option<String>,
    pub realtor_price_id: Option<String>,
    pub free_post_limit: i64,
    pub member_post_limit: i64,
    pub feed_window_days: i64,
    pub leads_window_days: i64,
    pub analyze_rate_limit: u32,
    pub analyze_rate_window_secs: i64,
    pub page_cache_ttl_secs: u64,
}

impl Settings {
    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.trim();
        !email.is_empty()
            && self
                .admin_emails
                .iter()
                .any(|admin| admin.trim().eq_ignore_ascii_case(email))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site_url: "http://localhost:3000".to_string(),
            admin_emails: Vec::new(),
            cron_secret: None,
            revalidate_secret: None,
            stripe_webhook_secret: None,
            member_price_id: None,
            realtor_price_id: None,
            free_post_limit: 5,
            member_post_limit: 100,
            feed_window_days: 30,
            leads_window_days: 30,
            analyze_rate_limit: 5,
            analyze_rate_window_secs: 3600,
            page_cache_ttl_secs: 300,
        }
    }
}

impl From<&Args> for Settings {
    fn from(args: &Args) -> Self {
        Self {
            site_url: args.site_url.trim_end_matches('/').to_string(),
            admin_emails: args
                .admin_emails
                .iter()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            cron_secret: args.cron_secret.clone().filter(|s| !s.is_empty()),
            revalidate_secret: args.revalidate_secret.clone().filter(|s| !s.is_empty()),
            stripe_webhook_secret: args.stripe.stripe_webhook_secret.clone(),
            member_price_id: args.stripe.stripe_price_id.clone(),
            realtor_price_id: args.stripe.stripe_realtor_price_id.clone(),
            free_post_limit: args.limits.free_post_limit,
            member_post_limit: args.limits.member_post_limit,
            feed_window_days: args.limits.feed_window_days,
            leads_window_days: args.limits.leads_window_days,
            analyze_rate_limit: args.limits.analyze_rate_limit,
            analyze_rate_window_secs: args.limits.analyze_rate_window_secs,
            page_cache_ttl_secs: args.limits.page_cache_ttl_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_match_ignores_case_and_blanks() {
        let settings = Settings {
            admin_emails: vec!["owner@dealsprints.com".to_string()],
            ..Default::default()
        };
        assert!(settings.is_admin("Owner@DealSprints.com"));
        assert!(!settings.is_admin("someone@else.com"));
        assert!(!settings.is_admin(""));
    }

    #[test]
    fn args_map_to_settings() {
        let args = Args::parse_from([
            "dealsprints-server",
            "--database-url",
            "postgres://localhost/dealsprints",
            "--supabase-jwt-secret",
            "secret",
            "--admin-emails",
            "A@x.com, b@y.com",
            "--site-url",
            "https://dealsprints.com/",
            "--free-post-limit",
            "3",
        ]);
        let settings = Settings::from(&args);
        assert_eq!(settings.admin_emails, vec!["a@x.com", "b@y.com"]);
        assert_eq!(settings.site_url, "https://dealsprints.com");
        assert_eq!(settings.free_post_limit, 3);
        assert_eq!(settings.member_post_limit, 100);
        assert!(!args.memory);
    }

    #[test]
    fn memory_mode_needs_no_database() {
        let args = Args::try_parse_from([
            "dealsprints-server",
            "--memory",
            "--supabase-jwt-secret",
            "secret",
        ]);
        assert!(args.is_ok_and(|a| a.memory));
    }
}
