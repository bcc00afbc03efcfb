use crate::models::{ReviewEvent, ReviewState, MAX_INTERVAL_DAYS, MIN_EASINESS_FACTOR};
use chrono::{DateTime, Duration, Utc};

/// Maps a binary answer plus optional self-reported confidence (1-5) onto the
/// SM-2 quality grade.
///
/// Grade:
/// 5 - Correct, confidence 4 or 5
/// 4 - Correct, confidence 3
/// 3 - Correct, low or no confidence
/// 1 - Incorrect, confidence 3 or lower (or none)
/// 0 - Incorrect with confidence 4 or 5. A confident miss is a misconception,
///     so it is graded below an unsure one.
///
/// Grade 2 is never produced.
pub fn quality_for(is_correct: bool, confidence_rating: Option<i32>) -> u8 {
    // Out of range ratings are clamped; 0 and below land on 1, same as absent.
    let confidence = confidence_rating.map(|c| c.clamp(1, 5));

    match (is_correct, confidence) {
        (true, Some(c)) if c >= 4 => 5,
        (true, Some(3)) => 4,
        (true, _) => 3,
        (false, Some(c)) if c >= 4 => 0,
        (false, _) => 1,
    }
}

/// Computes the next review state for one card.
///
/// `prior` is `None` the first time a card is reviewed; the default state
/// (EF 2.5, interval 0, repetitions 0) is used in its place. The next review
/// date is `now` plus `interval` whole days (rolling 24h windows, UTC).
///
/// EF has no upper bound, so the interval is capped at [`MAX_INTERVAL_DAYS`]
/// to keep long streaks inside the representable date range.
pub fn compute_next_review(
    prior: Option<&ReviewState>,
    event: ReviewEvent,
    now: DateTime<Utc>,
) -> ReviewState {
    let mut state = prior.cloned().unwrap_or_else(|| ReviewState::new(now));
    let grade = quality_for(event.is_correct, event.confidence_rating);

    if grade >= 3 {
        state.interval = match state.repetitions {
            0 => 1,
            1 => 6,
            _ => ((state.interval as f64 * state.easiness_factor).round() as u32)
                .min(MAX_INTERVAL_DAYS),
        };
        state.repetitions += 1;
    } else {
        // Lapse: back to daily review no matter how long the streak was
        state.repetitions = 0;
        state.interval = 1;
    }

    // EF' = EF + (0.1 - (5 - q) * (0.08 + (5 - q) * 0.02))
    let q = grade as f64;
    let new_ef = state.easiness_factor + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02));
    state.easiness_factor = new_ef.max(MIN_EASINESS_FACTOR);

    state.next_review_date = now
        .checked_add_signed(Duration::days(i64::from(state.interval)))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);

    state
}
