//! Subtitle trimmer (spec.md MODULE J): filters an SRT cue list by
//! overlap with keep-ranges and rebases cue times onto the concatenated
//! output timeline.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    pub text: Vec<String>,
}

/// Parses the conventional `index / HH:MM:SS,mmm --> HH:MM:SS,mmm / text...`
/// SRT layout. Blocks are separated by one or more blank lines; malformed
/// blocks are skipped with a warning rather than failing the whole file.
pub fn parse_srt(input: &str) -> Vec<Cue> {
    let mut cues = Vec::new();
    let normalized = input.replace("\r\n", "\n");
    for (block_no, block) in normalized.split("\n\n").enumerate() {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let mut lines = block.lines();
        let index_line = match lines.next() {
            Some(l) => l,
            None => continue,
        };
        let index: usize = match index_line.trim().parse() {
            Ok(i) => i,
            Err(_) => {
                log::warn!("srt block #{}: expected a cue index, got {:?}", block_no, index_line);
                continue;
            }
        };
        let time_line = match lines.next() {
            Some(l) => l,
            None => continue,
        };
        let (start, end) = match parse_time_range(time_line) {
            Some(t) => t,
            None => {
                log::warn!("srt block #{}: unparseable time range {:?}", block_no, time_line);
                continue;
            }
        };
        let text: Vec<String> = lines.map(|l| l.to_string()).collect();
        cues.push(Cue { index, start, end, text });
    }
    cues
}

fn parse_time_range(line: &str) -> Option<(Duration, Duration)> {
    let (left, right) = line.split_once("-->")?;
    Some((parse_timestamp(left.trim())?, parse_timestamp(right.trim())?))
}

fn parse_timestamp(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (hms, millis) = s.split_once(',').or_else(|| s.split_once('.'))?;
    let mut parts = hms.split(':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let sec: u64 = parts.next()?.parse().ok()?;
    let ms: u64 = millis.parse().ok()?;
    Some(Duration::from_millis(h * 3_600_000 + m * 60_000 + sec * 1_000 + ms))
}

pub fn format_timestamp(d: Duration) -> String {
    let total_ms = d.as_millis();
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let s = total_secs % 60;
    let total_mins = total_secs / 60;
    let m = total_mins % 60;
    let h = total_mins / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

pub fn write_srt(cues: &[Cue]) -> String {
    let mut out = String::new();
    for cue in cues {
        out.push_str(&cue.index.to_string());
        out.push('\n');
        out.push_str(&format!("{} --> {}\n", format_timestamp(cue.start), format_timestamp(cue.end)));
        for line in &cue.text {
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Filters and rebases `cues` against the ordered keep-ranges (already in
/// seconds, display-order, non-overlapping — same shape as the video
/// keep-list but in the time domain). A cue spanning a cut boundary is
/// emitted once per overlapping range with clamped endpoints, per
/// spec.md 4.J. Indices are renumbered from 1 in output order.
pub fn trim_cues(cues: &[Cue], keep_ranges_secs: &[(f64, f64)]) -> Vec<Cue> {
    let mut out = Vec::new();
    let mut offset = 0.0f64;
    let mut next_index = 1usize;

    for &(k_start, k_end) in keep_ranges_secs {
        for cue in cues {
            let cue_start = cue.start.as_secs_f64();
            let cue_end = cue.end.as_secs_f64();
            if cue_end <= k_start || cue_start >= k_end {
                continue;
            }
            let rebased_start = cue_start.max(k_start) - k_start + offset;
            let rebased_end = cue_end.min(k_end) - k_start + offset;
            out.push(Cue {
                index: next_index,
                start: Duration::from_secs_f64(rebased_start),
                end: Duration::from_secs_f64(rebased_end),
                text: cue.text.clone(),
            });
            next_index += 1;
        }
        offset += k_end - k_start;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: f64) -> Duration {
        Duration::from_secs_f64(n)
    }

    #[test]
    fn parses_a_basic_two_cue_file() {
        let input = "1\n00:00:01,000 --> 00:00:03,500\nHello\nworld\n\n2\n00:00:04,000 --> 00:00:05,000\nBye\n";
        let cues = parse_srt(input);
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].index, 1);
        assert_eq!(cues[0].start, Duration::from_millis(1000));
        assert_eq!(cues[0].end, Duration::from_millis(3500));
        assert_eq!(cues[0].text, vec!["Hello".to_string(), "world".to_string()]);
    }

    #[test]
    fn round_trip_format_and_parse_timestamp() {
        let d = Duration::from_millis(3_723_456);
        let s = format_timestamp(d);
        assert_eq!(s, "01:02:03,456");
        assert_eq!(parse_timestamp(&s), Some(d));
    }

    #[test]
    fn cue_entirely_within_one_keep_range_is_rebased() {
        let cues = vec![Cue { index: 1, start: secs(5.0), end: secs(6.0), text: vec!["x".into()] }];
        let out = trim_cues(&cues, &[(0.0, 10.0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].start, secs(5.0));
        assert_eq!(out[0].index, 1);
    }

    #[test]
    fn cue_outside_every_keep_range_is_dropped() {
        let cues = vec![Cue { index: 1, start: secs(20.0), end: secs(21.0), text: vec![] }];
        let out = trim_cues(&cues, &[(0.0, 10.0)]);
        assert!(out.is_empty());
    }

    #[test]
    fn cue_spanning_a_cut_is_emitted_in_both_ranges_clamped() {
        // Keep [0,5) then [10,15); a cue from 3..12 crosses the cut.
        let cues = vec![Cue { index: 1, start: secs(3.0), end: secs(12.0), text: vec!["split".into()] }];
        let out = trim_cues(&cues, &[(0.0, 5.0), (10.0, 15.0)]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].start, secs(3.0));
        assert_eq!(out[0].end, secs(5.0));
        assert_eq!(out[0].index, 1);
        // Second fragment starts at the second range's cut-in (10s),
        // rebased after 5s of already-kept content: 0 + 5 = 5s.
        assert_eq!(out[1].start, secs(5.0));
        assert_eq!(out[1].end, secs(7.0));
        assert_eq!(out[1].index, 2);
    }

    #[test]
    fn second_keep_range_offsets_by_prior_kept_duration() {
        let cues = vec![Cue { index: 1, start: secs(11.0), end: secs(12.0), text: vec![] }];
        let out = trim_cues(&cues, &[(0.0, 5.0), (10.0, 15.0)]);
        assert_eq!(out.len(), 1);
        // cue starts 1s into the second range, which itself starts at
        // offset 5s (the first range's duration).
        assert_eq!(out[0].start, secs(6.0));
        assert_eq!(out[0].end, secs(7.0));
    }
}
