use url::Url;

#[cfg(feature = "client")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid url")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("not found: {0}")]
    NotFound(Url),
    #[error("Spoolman API error: {0}\n{1}")]
    ServerError(reqwest::StatusCode, String),
}

/// Root used when no Spoolman address is configured: a same-origin proxy
/// that forwards `/spoolman/*` to the real instance.
pub const DEFAULT_PROXY_URL: &str = "http://localhost:5173/spoolman/";

#[derive(Default, Debug, Clone)]
pub struct ClientConfig {
    pub url_base: Option<Url>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Points the client at a Spoolman instance. An empty string selects the
    /// default proxy.
    pub fn with_url(mut self, url: impl AsRef<str>) -> Result<Self, url::ParseError> {
        self.url_base = normalize_base_url(url.as_ref())?;
        Ok(self)
    }

    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        match &self.url_base {
            Some(url) => Ok(url.clone()),
            None => Url::parse(DEFAULT_PROXY_URL),
        }
    }
}

/// Trims whitespace and trailing slashes, then adds back exactly one slash so
/// that relative joins keep the whole path.
pub fn normalize_base_url(url: &str) -> Result<Option<Url>, url::ParseError> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }
    Url::parse(&format!("{trimmed}/")).map(Some)
}

macro_rules! declare_client_impl {
    ($async_or_blocking: ident) => {
        declare_client! {
            $async_or_blocking;

            get spools(
                ("spool"),
            ) -> Vec<crate::spoolman::Spool>;
            get spools_details(
                ("spool/{id}", id: i64),
            ) -> crate::spoolman::Spool;
            get filaments(
                ("filament"),
            ) -> Vec<crate::spoolman::Filament>;
            get vendors(
                ("vendor"),
            ) -> Vec<crate::spoolman::Vendor>;
        }
    };
}

macro_rules! declare_client {
    (
        url;

        $(
            $(#[$fattr:meta])*
            $method: ident $fname: ident(
                (
                    $url: literal $(,)?
                    $( $path_name: ident: $path_type: ty ),*
                    $(,)?
                ) $(,)?
            ) -> $rtype: ty;
        )*
    ) => {
        $(
            $(#[$fattr])*
            pub fn $fname(url: &Url, $( $path_name: $path_type, )*) -> Result<Url, url::ParseError> {
                url.join(BASE)?.join(&format!($url))
            }
        )*
    };

    (
        async;

        $(
            $(#[$fattr:meta])*
            $method: ident $fname: ident(
                (
                    $url: literal $(,)?
                    $( $path_name: ident: $path_type: ty ),*
                    $(,)?
                ) $(,)?
            ) -> $rtype: ty;
        )*
    ) => {
        $(
            $(#[$fattr])*
            pub async fn $fname(
                &self,
                $( $path_name: $path_type, )*
            ) -> Result<$rtype, super::Error> {
                let url = crate::client::routes::v1:: $fname ( &self.0, $( $path_name, )* )?;
                tracing::debug!(method = stringify!($method), %url, "spoolman request");

                let response = self.1
                    . $method (url.clone())
                    .send()
                    .await?;

                let status = response.status();
                if status.is_success() {
                    Ok(response.json().await?)
                } else if status == reqwest::StatusCode::NOT_FOUND {
                    Err(super::Error::NotFound(url))
                } else {
                    let body = response.text().await?;
                    Err(super::Error::ServerError(
                        status,
                        crate::error::JsonError::message_from(&body),
                    ))
                }
            }
        )*
    };

    (
        blocking;

        $(
            $(#[$fattr:meta])*
            $method: ident $fname: ident(
                (
                    $url: literal $(,)?
                    $( $path_name: ident: $path_type: ty ),*
                    $(,)?
                ) $(,)?
            ) -> $rtype: ty;
        )*
    ) => {
        $(
            $(#[$fattr])*
            pub fn $fname(
                &self,
                $( $path_name: $path_type, )*
            ) -> Result<$rtype, super::Error> {
                let url = crate::client::routes::v1:: $fname ( &self.0, $( $path_name, )* )?;
                tracing::debug!(method = stringify!($method), %url, "spoolman request");

                let response = self.1
                    . $method (url.clone())
                    .send()?;

                let status = response.status();
                if status.is_success() {
                    Ok(response.json()?)
                } else if status == reqwest::StatusCode::NOT_FOUND {
                    Err(super::Error::NotFound(url))
                } else {
                    let body = response.text()?;
                    Err(super::Error::ServerError(
                        status,
                        crate::error::JsonError::message_from(&body),
                    ))
                }
            }
        )*
    };
}

pub mod routes {
    pub mod v1 {
        use url::Url;

        pub const BASE: &str = "api/v1/";

        declare_client_impl!(url);
    }
}

#[cfg(feature = "client")]
pub mod v1 {
    use crate::client::ClientConfig;
    use reqwest::{Client, Url};

    pub struct SpoolmanClient(Url, Client);

    #[cfg(feature = "blocking")]
    pub struct BlockingSpoolmanClient(Url, reqwest::blocking::Client);

    impl SpoolmanClient {
        pub fn new(config: ClientConfig) -> Result<Self, super::Error> {
            Ok(Self(config.base_url()?, Client::builder().build()?))
        }

        pub fn base_url(&self) -> &Url {
            &self.0
        }

        declare_client_impl!(async);
    }

    #[cfg(feature = "blocking")]
    impl BlockingSpoolmanClient {
        pub fn new(config: ClientConfig) -> Result<Self, super::Error> {
            Ok(Self(
                config.base_url()?,
                reqwest::blocking::Client::builder().build()?,
            ))
        }

        pub fn base_url(&self) -> &Url {
            &self.0
        }

        declare_client_impl!(blocking);
    }
}

#[cfg(feature = "blocking")]
pub use v1::BlockingSpoolmanClient;
#[cfg(feature = "client")]
pub use v1::SpoolmanClient;

#[cfg(test)]
mod tests {
    use super::routes::v1;
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("", None)]
    #[case("   ", None)]
    #[case("http://192.168.1.100:7912", Some("http://192.168.1.100:7912/"))]
    #[case("http://192.168.1.100:7912/", Some("http://192.168.1.100:7912/"))]
    #[case("https://home.lan/spoolman//", Some("https://home.lan/spoolman/"))]
    fn normalizes_base_url(#[case] input: &str, #[case] expected: Option<&str>) {
        let url = normalize_base_url(input).unwrap();
        assert_eq!(url.as_ref().map(Url::as_str), expected);
    }

    #[test]
    fn rejects_relative_base_url() {
        assert!(ClientConfig::new().with_url("spoolman.local").is_err());
    }

    #[test]
    fn empty_config_uses_proxy() {
        let base = ClientConfig::new().with_url("").unwrap().base_url().unwrap();

        assert_eq!(
            v1::spools(&base).unwrap().as_str(),
            "http://localhost:5173/spoolman/api/v1/spool"
        );
    }

    #[test]
    fn routes_keep_base_path() {
        let base = ClientConfig::new()
            .with_url("https://home.lan/inventory")
            .unwrap()
            .base_url()
            .unwrap();

        assert_eq!(
            v1::spools_details(&base, 42).unwrap().as_str(),
            "https://home.lan/inventory/api/v1/spool/42"
        );
        assert_eq!(
            v1::filaments(&base).unwrap().as_str(),
            "https://home.lan/inventory/api/v1/filament"
        );
        assert_eq!(
            v1::vendors(&base).unwrap().as_str(),
            "https://home.lan/inventory/api/v1/vendor"
        );
    }
}
