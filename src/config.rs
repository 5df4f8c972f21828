#[derive(clap::ValueEnum, Clone, Debug, Copy, PartialEq, Eq)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Debug, Clone)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // proxy tried after a blocked direct request, anything reqwest::Proxy::all accepts
    #[clap(long, env)]
    pub proxy: Option<String>,

    // comma separated list of proxies handed out two at a time once PROXY is exhausted
    #[clap(long, env, value_delimiter = ',')]
    pub proxy_pool: Vec<String>,

    // what the rewritten manifests point back at, like https://edge.example.com/api/v1/dlhd
    // when unset it's rebuilt from the forwarded/host headers of every request
    #[clap(long, env)]
    pub public_base_url: Option<String>,

    // signs the key urls written into manifests, 'openssl rand -base64 32' or similar.
    // leave it out and the key route is open
    #[clap(long, env)]
    pub key_signing_secret: Option<String>,

    // site mirrors, they move around so keep this a list
    #[clap(
        long,
        env,
        value_delimiter = ',',
        default_value = "https://daddylive.sx/,https://dlhd.dad/"
    )]
    pub dlhd_domains: Vec<String>,

    #[clap(long, env, default_value = "newkso.ru")]
    pub dlhd_cdn_domain: String,

    // this should be either * for allowing everything, or a comma seperated list of domains like
    // example.com,something.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl Default for AppConfig {
    // same values clap falls back to, mostly for tests
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            proxy: None,
            proxy_pool: Vec::new(),
            public_base_url: None,
            key_signing_secret: None,
            dlhd_domains: vec![
                "https://daddylive.sx/".to_string(),
                "https://dlhd.dad/".to_string(),
            ],
            dlhd_cdn_domain: "newkso.ru".to_string(),
            cors_origin: "*".to_string(),
            sentry_dsn: None,
        }
    }
}
