use crate::lrc::TimedLine;

/// Index of the line in effect at `t` seconds.
///
/// The line at `i` covers `lines[i].time <= t < lines[i + 1].time`; the last
/// line runs forever. Returns `None` before the first line, for NaN, or when
/// there are no lines. Equal timestamps resolve to the last of the group.
pub fn active_line(lines: &[TimedLine], t: f64) -> Option<usize> {
    if t.is_nan() {
        return None;
    }
    // Lines are sorted, so "has started" is monotone over the slice.
    let started = lines.partition_point(|l| l.seconds() <= t);
    started.checked_sub(1)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn lines(times: &[u64]) -> Vec<TimedLine> {
        times
            .iter()
            .enumerate()
            .map(|(i, &s)| TimedLine::new(Duration::from_secs(s), format!("line {i}")))
            .collect()
    }

    #[test]
    fn picks_the_current_line() {
        let l = lines(&[0, 5, 10]);
        assert_eq!(active_line(&l, 4.9), Some(0));
        assert_eq!(active_line(&l, 5.0), Some(1));
        assert_eq!(active_line(&l, 12.0), Some(2));
        assert_eq!(active_line(&l, -1.0), None);
    }

    #[test]
    fn nothing_before_first_line_or_when_empty() {
        let l = lines(&[3, 6]);
        assert_eq!(active_line(&l, 2.99), None);
        assert_eq!(active_line(&[], 10.0), None);
        assert_eq!(active_line(&l, f64::NAN), None);
        assert_eq!(active_line(&l, f64::INFINITY), Some(1));
    }

    #[test]
    fn ties_resolve_to_last_of_group() {
        let l = lines(&[0, 4, 4, 8]);
        assert_eq!(active_line(&l, 4.0), Some(2));
        assert_eq!(active_line(&l, 7.0), Some(2));
    }

    #[test]
    fn same_input_same_answer_across_seeks() {
        let l = lines(&[0, 5, 10, 15]);
        let first = active_line(&l, 7.5);
        for t in [14.0, 1.0, 7.5, 20.0, 7.5] {
            let _ = active_line(&l, t);
        }
        assert_eq!(active_line(&l, 7.5), first);
        assert_eq!(first, Some(1));
    }
}
