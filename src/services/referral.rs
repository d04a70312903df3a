use ring::rand::{SecureRandom, SystemRandom};

const PREFIX_LEN: usize = 4;
const SUFFIX_LEN: usize = 6;
const MAX_ATTEMPTS: usize = 5;

/// 32 symbols without I, O, 0 and 1, so a byte maps without bias via `% 32`
const ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(thiserror::Error, Debug)]
pub enum ReferralError {
    #[error("Random number generator failed")]
    Rng,

    #[error("No free referral code after {0} attempts")]
    Exhausted(usize),
}

/// Builds `NAME-XXXXXX` from a display name and six random bytes
pub fn encode_referral_code(display_name: &str, random: [u8; SUFFIX_LEN]) -> String {
    let mut code: String = display_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .take(PREFIX_LEN)
        .collect();

    while code.len() < PREFIX_LEN {
        code.push('X');
    }

    code.push('-');
    code.extend(
        random
            .iter()
            .map(|b| ALPHABET[(*b as usize) % ALPHABET.len()] as char),
    );

    code
}

pub fn generate_referral_code(
    display_name: &str,
    rng: &SystemRandom,
) -> Result<String, ReferralError> {
    let mut random = [0u8; SUFFIX_LEN];
    rng.fill(&mut random).map_err(|_| ReferralError::Rng)?;

    Ok(encode_referral_code(display_name, random))
}

/// Generates codes until `is_taken` accepts one
pub fn generate_unique_referral_code(
    display_name: &str,
    rng: &SystemRandom,
    mut is_taken: impl FnMut(&str) -> bool,
) -> Result<String, ReferralError> {
    for attempt in 1..=MAX_ATTEMPTS {
        let code = generate_referral_code(display_name, rng)?;
        if !is_taken(&code) {
            return Ok(code);
        }
        tracing::debug!(attempt, "Referral code collision");
    }

    Err(ReferralError::Exhausted(MAX_ATTEMPTS))
}
