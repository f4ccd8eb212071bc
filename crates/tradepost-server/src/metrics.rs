// SPDX-License-Identifier: Apache-2.0

//! In-process request metrics, rendered as Prometheus text on demand.
//! Latency quantiles come from a bounded window of recent samples per
//! route rather than a full histogram.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;

const LATENCY_WINDOW: usize = 512;

#[derive(Default)]
pub struct RequestMetrics {
    counts: Mutex<HashMap<(String, u16), u64>>,
    latency_recent_ns: Mutex<HashMap<String, VecDeque<u64>>>,
    in_flight: AtomicI64,
    webhook_outcomes: Mutex<HashMap<String, u64>>,
    close_outcomes: Mutex<HashMap<String, u64>>,
}

impl RequestMetrics {
    pub fn request_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn observe_request(&self, route: &str, status: u16, latency_ns: u64) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        let mut counts = self.counts.lock().await;
        *counts.entry((route.to_string(), status)).or_insert(0) += 1;
        drop(counts);
        let mut recent = self.latency_recent_ns.lock().await;
        let window = recent.entry(route.to_string()).or_default();
        if window.len() >= LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency_ns);
    }

    pub async fn observe_webhook(&self, outcome: &str) {
        let mut outcomes = self.webhook_outcomes.lock().await;
        *outcomes.entry(outcome.to_string()).or_insert(0) += 1;
    }

    pub async fn observe_close(&self, status: &str) {
        let mut outcomes = self.close_outcomes.lock().await;
        *outcomes.entry(status.to_string()).or_insert(0) += 1;
    }

    pub async fn render_prometheus(&self) -> String {
        let mut body = String::new();
        body.push_str("# TYPE tradepost_requests_total counter\n");
        let counts = self.counts.lock().await;
        let mut count_rows: Vec<_> = counts.iter().collect();
        count_rows.sort_by(|a, b| a.0.cmp(b.0));
        for ((route, status), n) in count_rows {
            body.push_str(&format!(
                "tradepost_requests_total{{route=\"{route}\",status=\"{status}\"}} {n}\n"
            ));
        }
        drop(counts);

        body.push_str("# TYPE tradepost_request_latency_ms gauge\n");
        let recent = self.latency_recent_ns.lock().await;
        let mut routes: Vec<_> = recent.keys().collect();
        routes.sort();
        for route in routes {
            let mut samples: Vec<u64> = recent[route].iter().copied().collect();
            samples.sort_unstable();
            for (label, pct) in [("0.5", 0.5), ("0.95", 0.95), ("0.99", 0.99)] {
                let ms = percentile_ns(&samples, pct) as f64 / 1_000_000.0;
                body.push_str(&format!(
                    "tradepost_request_latency_ms{{route=\"{route}\",quantile=\"{label}\"}} {ms:.3}\n"
                ));
            }
        }
        drop(recent);

        body.push_str("# TYPE tradepost_requests_in_flight gauge\n");
        body.push_str(&format!(
            "tradepost_requests_in_flight {}\n",
            self.in_flight.load(Ordering::Relaxed).max(0)
        ));

        body.push_str("# TYPE tradepost_webhook_events_total counter\n");
        let outcomes = self.webhook_outcomes.lock().await;
        let mut rows: Vec<_> = outcomes.iter().collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        for (outcome, n) in rows {
            body.push_str(&format!(
                "tradepost_webhook_events_total{{outcome=\"{outcome}\"}} {n}\n"
            ));
        }
        drop(outcomes);

        body.push_str("# TYPE tradepost_close_runs_total counter\n");
        let outcomes = self.close_outcomes.lock().await;
        let mut rows: Vec<_> = outcomes.iter().collect();
        rows.sort_by(|a, b| a.0.cmp(b.0));
        for (status, n) in rows {
            body.push_str(&format!(
                "tradepost_close_runs_total{{status=\"{status}\"}} {n}\n"
            ));
        }
        body
    }
}

/// `samples` must already be sorted ascending.
fn percentile_ns(samples: &[u64], pct: f64) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    let idx = ((samples.len() as f64 - 1.0) * pct).round() as usize;
    samples[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counters_and_quantiles_show_up_in_the_rendering() {
        let metrics = RequestMetrics::default();
        metrics.request_started();
        metrics
            .observe_request("/v1/products", 200, 2_000_000)
            .await;
        metrics.request_started();
        metrics
            .observe_request("/v1/products", 200, 4_000_000)
            .await;
        metrics.request_started();
        metrics.observe_request("/v1/checkout", 422, 1_000_000).await;
        metrics.observe_webhook("applied").await;
        metrics.observe_webhook("applied").await;
        metrics.observe_close("balanced").await;

        let body = metrics.render_prometheus().await;
        assert!(body.contains(
            "tradepost_requests_total{route=\"/v1/products\",status=\"200\"} 2"
        ));
        assert!(body.contains(
            "tradepost_requests_total{route=\"/v1/checkout\",status=\"422\"} 1"
        ));
        assert!(body.contains(
            "tradepost_request_latency_ms{route=\"/v1/products\",quantile=\"0.5\"}"
        ));
        assert!(body.contains("tradepost_requests_in_flight 0"));
        assert!(body.contains("tradepost_webhook_events_total{outcome=\"applied\"} 2"));
        assert!(body.contains("tradepost_close_runs_total{status=\"balanced\"} 1"));
    }

    #[tokio::test]
    async fn latency_window_is_bounded() {
        let metrics = RequestMetrics::default();
        for n in 0..(LATENCY_WINDOW as u64 + 100) {
            metrics.request_started();
            metrics.observe_request("/v1/products", 200, n).await;
        }
        let recent = metrics.latency_recent_ns.lock().await;
        assert_eq!(recent["/v1/products"].len(), LATENCY_WINDOW);
        // Oldest samples fell out.
        assert_eq!(*recent["/v1/products"].front().unwrap(), 100);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile_ns(&[], 0.99), 0);
    }
}
