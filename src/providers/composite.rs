use crate::error::{ConfigError, ProviderError};
use crate::providers::SearchProvider;
use crate::types::SearchResult;
use tracing::{info, warn};

/// Priority-ordered fan-out over a fixed list of providers. Ordering never
/// changes at runtime; the only configuration error this type raises is an
/// empty provider list at construction.
pub struct CompositeEngine {
    providers: Vec<Box<dyn SearchProvider>>,
}

impl CompositeEngine {
    pub fn new(providers: Vec<Box<dyn SearchProvider>>) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }
        Ok(Self { providers })
    }

    /// Try providers in priority order. The first provider that returns a
    /// non-empty list wins; an empty result or an error is a soft failure
    /// that advances to the next provider. Returns an empty list only when
    /// every provider soft-fails.
    pub async fn search(&self, sub_queries: &[String]) -> Vec<SearchResult> {
        for provider in &self.providers {
            match provider.search(sub_queries).await {
                Ok(results) if !results.is_empty() => {
                    info!(
                        "composite engine: '{}' returned {} results",
                        provider.name(),
                        results.len()
                    );
                    return results;
                }
                Ok(_) => {
                    info!(
                        "composite engine: '{}' returned no results, advancing",
                        provider.name()
                    );
                }
                Err(ProviderError::Blocked { reason }) => {
                    warn!(
                        "composite engine: '{}' blocked ({}), advancing",
                        provider.name(),
                        reason
                    );
                }
                Err(e) => {
                    warn!(
                        "composite engine: '{}' failed ({}), advancing",
                        provider.name(),
                        e
                    );
                }
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StubProvider {
        name: &'static str,
        result: Result<Vec<SearchResult>, ProviderError>,
    }

    #[async_trait]
    impl SearchProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn search(&self, _sub_queries: &[String]) -> Result<Vec<SearchResult>, ProviderError> {
            self.result.clone()
        }
    }

    // ProviderError doesn't derive Clone upstream; hand-roll a cheap clone
    // for this test double.
    impl Clone for ProviderError {
        fn clone(&self) -> Self {
            match self {
                ProviderError::Blocked { reason } => ProviderError::Blocked {
                    reason: reason.clone(),
                },
                ProviderError::Transient(s) => ProviderError::Transient(s.clone()),
                ProviderError::Fatal(s) => ProviderError::Fatal(s.clone()),
            }
        }
    }

    fn hit(url: &str) -> SearchResult {
        SearchResult {
            title: "Hit".to_string(),
            url: url.to_string(),
            snippet: "x".to_string(),
            source_engine: "stub".to_string(),
            rank: None,
        }
    }

    #[test]
    fn empty_provider_list_is_a_config_error() {
        let result = CompositeEngine::new(vec![]);
        assert!(matches!(result, Err(ConfigError::NoProviders)));
    }

    #[tokio::test]
    async fn falls_through_to_secondary_on_empty_primary() {
        let primary = Box::new(StubProvider {
            name: "primary",
            result: Ok(vec![]),
        });
        let secondary = Box::new(StubProvider {
            name: "secondary",
            result: Ok(vec![hit("http://a.com")]),
        });
        let engine = CompositeEngine::new(vec![primary, secondary]).unwrap();
        let results = engine.search(&["q".to_string()]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "http://a.com");
    }

    #[tokio::test]
    async fn falls_through_to_secondary_on_primary_error() {
        let primary = Box::new(StubProvider {
            name: "primary",
            result: Err(ProviderError::Blocked {
                reason: "captcha".to_string(),
            }),
        });
        let secondary = Box::new(StubProvider {
            name: "secondary",
            result: Ok(vec![hit("http://a.com")]),
        });
        let engine = CompositeEngine::new(vec![primary, secondary]).unwrap();
        let results = engine.search(&["q".to_string()]).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn returns_empty_when_every_provider_soft_fails() {
        let primary = Box::new(StubProvider {
            name: "primary",
            result: Ok(vec![]),
        });
        let secondary = Box::new(StubProvider {
            name: "secondary",
            result: Err(ProviderError::Transient("timeout".to_string())),
        });
        let engine = CompositeEngine::new(vec![primary, secondary]).unwrap();
        let results = engine.search(&["q".to_string()]).await;
        assert!(results.is_empty());
    }
}
