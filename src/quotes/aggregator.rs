//! Parallel quote fan-out and ranking

use super::{Quote, QuoteRequest, QuoteSource, Slippage};
use crate::error::{EngineError, EngineResult};

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Default per-source quote timeout
pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Queries every registered source concurrently and ranks the answers
pub struct QuoteAggregator {
    /// Sources in registration order; earlier sources win ties
    sources: Vec<Arc<dyn QuoteSource>>,
    source_timeout: Duration,
}

impl QuoteAggregator {
    pub fn new(sources: Vec<Arc<dyn QuoteSource>>, source_timeout: Duration) -> Self {
        Self {
            sources,
            source_timeout,
        }
    }

    /// Registered source ids in order
    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Look up a source by id
    pub fn source(&self, id: &str) -> Option<Arc<dyn QuoteSource>> {
        self.sources.iter().find(|s| s.id() == id).cloned()
    }

    /// Fetch quotes from every source that supports the request.
    ///
    /// Sources that error, time out or return a zero output are dropped. The
    /// result is sorted by `min_output_amount` descending with ties kept in
    /// registration order. An empty result is `NoRouteFound`.
    pub async fn get_quotes(
        &self,
        request: &QuoteRequest,
        slippage: Slippage,
    ) -> EngineResult<Vec<Quote>> {
        let eligible: Vec<Arc<dyn QuoteSource>> = self
            .sources
            .iter()
            .filter(|source| source.supports(request))
            .cloned()
            .collect();

        debug!(
            "Requesting quotes from {} of {} sources at {}",
            eligible.len(),
            self.sources.len(),
            slippage
        );

        let tasks = eligible.into_iter().map(|source| async move {
            let result = timeout(self.source_timeout, source.quote(request, slippage)).await;
            (source, result)
        });

        let mut quotes = Vec::new();
        for (source, result) in join_all(tasks).await {
            match result {
                Ok(Ok(mut quote)) if !quote.min_output_amount.is_zero() => {
                    quote.source_id = source.id().to_string();
                    debug!(
                        "Quote from {}: min output {}",
                        quote.source_id, quote.min_output_amount
                    );
                    crate::metrics::record_quote_received(source.id());
                    quotes.push(quote);
                }
                Ok(Ok(_)) => {
                    warn!("Source {} returned an empty route", source.id());
                    crate::metrics::record_quote_failed(source.id());
                }
                Ok(Err(e)) => {
                    warn!("Source {} returned error: {}", source.id(), e);
                    crate::metrics::record_quote_failed(source.id());
                }
                Err(_) => {
                    warn!(
                        "Source {} timed out after {:?}",
                        source.id(),
                        self.source_timeout
                    );
                    crate::metrics::record_quote_failed(source.id());
                }
            }
        }

        if quotes.is_empty() {
            return Err(EngineError::NoRouteFound {
                slippage_bps: slippage.bps(),
            });
        }

        rank(&mut quotes);

        info!(
            "Collected {} quotes at {}; best {} from {}",
            quotes.len(),
            slippage,
            quotes[0].min_output_amount,
            quotes[0].source_id
        );
        Ok(quotes)
    }
}

/// Stable sort, best output first
pub fn rank(quotes: &mut [Quote]) {
    quotes.sort_by(|a, b| b.min_output_amount.cmp(&a.min_output_amount));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{quote_request, FakeSource};
    use ethers::types::U256;

    fn ids(quotes: &[Quote]) -> Vec<&str> {
        quotes.iter().map(|q| q.source_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_orders_by_min_output_descending() {
        let x = FakeSource::new("X").with_output(100);
        let y = FakeSource::new("Y").with_output(120);
        let sources: Vec<Arc<dyn QuoteSource>> = vec![Arc::new(x), Arc::new(y)];
        let aggregator = QuoteAggregator::new(sources, DEFAULT_QUOTE_TIMEOUT);

        let quotes = aggregator
            .get_quotes(&quote_request(), Slippage::from_bps(100))
            .await
            .unwrap();
        assert_eq!(ids(&quotes), vec!["Y", "X"]);
        assert_eq!(quotes[0].min_output_amount, U256::from(120));
    }

    #[tokio::test]
    async fn test_ties_keep_registration_order() {
        let sources: Vec<Arc<dyn QuoteSource>> = vec![
            Arc::new(FakeSource::new("first").with_output(500)),
            Arc::new(FakeSource::new("second").with_output(700)),
            Arc::new(FakeSource::new("third").with_output(500)),
            Arc::new(FakeSource::new("fourth").with_output(700)),
        ];
        let aggregator = QuoteAggregator::new(sources, DEFAULT_QUOTE_TIMEOUT);

        let quotes = aggregator
            .get_quotes(&quote_request(), Slippage::from_bps(100))
            .await
            .unwrap();
        assert_eq!(ids(&quotes), vec!["second", "fourth", "first", "third"]);
    }

    #[tokio::test]
    async fn test_failed_and_slow_sources_are_omitted() {
        let sources: Vec<Arc<dyn QuoteSource>> = vec![
            Arc::new(FakeSource::new("broken").failing_quotes()),
            Arc::new(
                FakeSource::new("slow")
                    .with_output(1_000)
                    .with_delay(Duration::from_millis(200)),
            ),
            Arc::new(FakeSource::new("ok").with_output(10)),
        ];
        let aggregator = QuoteAggregator::new(sources, Duration::from_millis(50));

        let quotes = aggregator
            .get_quotes(&quote_request(), Slippage::from_bps(100))
            .await
            .unwrap();
        assert_eq!(ids(&quotes), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_no_route_when_every_source_fails() {
        let sources: Vec<Arc<dyn QuoteSource>> =
            vec![Arc::new(FakeSource::new("broken").failing_quotes())];
        let aggregator = QuoteAggregator::new(sources, DEFAULT_QUOTE_TIMEOUT);

        let err = aggregator
            .get_quotes(&quote_request(), Slippage::from_bps(150))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NoRouteFound { slippage_bps: 150 }));
    }

    #[tokio::test]
    async fn test_sources_not_supporting_request_are_skipped() {
        let same_chain_only = FakeSource::new("dex").with_output(900);
        let bridge = FakeSource::new("bridge").with_output(800).cross_chain();
        let sources: Vec<Arc<dyn QuoteSource>> = vec![Arc::new(same_chain_only), Arc::new(bridge)];
        let aggregator = QuoteAggregator::new(sources, DEFAULT_QUOTE_TIMEOUT);

        let mut request = quote_request();
        request.to_chain = 137;
        let quotes = aggregator
            .get_quotes(&request, Slippage::from_bps(100))
            .await
            .unwrap();
        assert_eq!(ids(&quotes), vec!["bridge"]);
    }
}
