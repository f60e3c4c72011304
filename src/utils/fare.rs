//! Trip fare policy.
//!
//! `fare = max(MIN_FARE, ceil(distance_km * RATE_PER_KM))`, computed once
//! from the routed pickup→destination distance when the trip completes.

/// Flat minimum fare in rupees.
pub const MIN_FARE: u32 = 25;

/// Rupees charged per kilometre.
pub const RATE_PER_KM: u64 = 5;

/// Fare for a trip of `distance_m` metres.
pub fn calculate_fare(distance_m: u64) -> u32 {
    // ceil(m / 1000 * rate) without going through floats
    let per_km = (distance_m.saturating_mul(RATE_PER_KM)).div_ceil(1000);
    let per_km = u32::try_from(per_km).unwrap_or(u32::MAX);
    per_km.max(MIN_FARE)
}
