//! CLI parsing helpers for clap value parsers.

use super::MAX_JOBS;

pub(super) fn parse_jobs(s: &str) -> Result<usize, String> {
    let value: usize = s
        .trim()
        .parse()
        .map_err(|_| format!("{s} is not a valid number"))?;
    if (1..=MAX_JOBS).contains(&value) {
        Ok(value)
    } else {
        Err(format!("jobs must be between 1 and {MAX_JOBS}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1", Ok(1))]
    #[case(" 8 ", Ok(8))]
    #[case("64", Ok(64))]
    #[case("0", Err("jobs must be between 1 and 64".to_owned()))]
    #[case("65", Err("jobs must be between 1 and 64".to_owned()))]
    #[case("many", Err("many is not a valid number".to_owned()))]
    fn validates_job_counts(#[case] input: &str, #[case] expected: Result<usize, String>) {
        assert_eq!(parse_jobs(input), expected);
    }
}
