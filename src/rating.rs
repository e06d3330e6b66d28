/// Mean review score; `None` when a title has no reviews yet.
pub fn average<I>(scores: I) -> Option<f64>
where
    I: IntoIterator<Item = i32>,
{
    let (sum, n) = scores
        .into_iter()
        .fold((0i64, 0u32), |(sum, n), s| (sum + i64::from(s), n + 1));
    if n == 0 { None } else { Some(sum as f64 / f64::from(n)) }
}
