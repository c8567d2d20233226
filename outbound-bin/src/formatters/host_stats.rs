use std::io::{self, Write};

use outbound_lib::HostStatsMap;

/// Write one line per contacted host, busiest host first
pub(crate) fn write_host_stats<W: Write>(writer: &mut W, host_stats: &HostStatsMap) -> io::Result<()> {
    let sorted_hosts = host_stats.sorted();
    let Some(width) = sorted_hosts.iter().map(|(host, _)| host.len()).max() else {
        return Ok(());
    };

    for (host, stats) in sorted_hosts {
        let median = stats
            .median_request_time()
            .map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()));
        let rejected = stats.rejected_by_rate_limit + stats.rejected_by_circuit;

        writeln!(
            writer,
            "{host:<width$} │ {:>4} reqs │ {:>5.1}% success │ {median:>7} median │ {:>3} retries │ {rejected:>3} rejected",
            stats.total_requests,
            stats.success_rate() * 100.0,
            stats.retries,
        )?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use outbound_lib::HostStats;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn render(host_stats: &HostStatsMap) -> String {
        let mut out = Vec::new();
        write_host_stats(&mut out, host_stats).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_no_hosts() {
        assert_eq!(render(&HostStatsMap::default()), "");
    }

    #[test]
    fn test_busiest_host_first() {
        let busy = HostStats {
            total_requests: 4,
            successful_requests: 3,
            retries: 1,
            ..HostStats::default()
        };
        let quiet = HostStats {
            total_requests: 1,
            successful_requests: 1,
            rejected_by_circuit: 2,
            ..HostStats::default()
        };
        let host_stats = HostStatsMap::from(HashMap::from([
            ("https://a.example".to_string(), quiet),
            ("https://prices.example".to_string(), busy),
        ]));

        let output = render(&host_stats);
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("https://prices.example │    4 reqs │  75.0% success"));
        assert!(lines[0].ends_with("  1 retries │   0 rejected"));
        assert!(lines[1].starts_with("https://a.example      │    1 reqs │ 100.0% success"));
        assert!(lines[1].ends_with("  2 rejected"));
    }
}
