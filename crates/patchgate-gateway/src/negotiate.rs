// negotiate.rs — Accept header content negotiation.
//
// Picks the offer the client prefers. An exact match beats `type/*`, which
// beats `*/*`; among equally specific matches the higher q-value wins, and
// on a tie the earlier offer wins. Media ranges with q=0 are ignored, as
// are malformed ones. Without a usable match the default is returned.

use axum::http::header::ACCEPT;
use axum::http::HeaderMap;

#[derive(Debug, Clone, PartialEq)]
struct AcceptSpec {
    value: String,
    q: f64,
}

fn parse_accept(headers: &HeaderMap) -> Vec<AcceptSpec> {
    let mut specs = Vec::new();
    for header in headers.get_all(ACCEPT) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for range in header.split(',') {
            let mut parts = range.split(';');
            let value = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            if value.is_empty() || !value.contains('/') {
                continue;
            }
            let mut q = Some(1.0);
            for param in parts {
                if let Some((name, raw)) = param.split_once('=') {
                    if name.trim().eq_ignore_ascii_case("q") {
                        q = raw.trim().parse::<f64>().ok().filter(|q| (0.0..=1.0).contains(q));
                    }
                }
            }
            if let Some(q) = q {
                specs.push(AcceptSpec { value, q });
            }
        }
    }
    specs
}

/// Return the best of `offers` for the request's `Accept` header, or
/// `default` when none is acceptable.
pub fn negotiate_content_type<'a>(
    headers: &HeaderMap,
    offers: &[&'a str],
    default: &'a str,
) -> &'a str {
    let specs = parse_accept(headers);
    let mut best = default;
    let mut best_q = -1.0;
    // 0 = exact, 1 = type/*, 2 = */*; 3 = nothing matched yet.
    let mut best_wild = 3;

    for &offer in offers {
        for spec in &specs {
            if spec.q == 0.0 || spec.q < best_q {
                continue;
            }
            let wild = if spec.value == "*/*" {
                2
            } else if let Some(prefix) = spec.value.strip_suffix('*') {
                if !offer.starts_with(prefix) {
                    continue;
                }
                1
            } else if spec.value == offer {
                0
            } else {
                continue;
            };
            if spec.q > best_q || best_wild > wild {
                best_q = spec.q;
                best_wild = wild;
                best = offer;
            }
        }
    }
    best
}
