use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use regex::Regex;

lazy_static! {
    static ref PLAYABLE_URI: Regex =
        Regex::new(r"^spotify:(track|episode):[A-Za-z0-9]+$").unwrap();
}

pub fn random_string(length: usize) -> String {
    let mut rng = thread_rng();

    std::iter::repeat(())
        .map(|_| rng.sample(Alphanumeric) as char)
        .take(length)
        .collect()
}

/// Generates a fresh session id
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Returns true if the uri is something the playback queue accepts
pub fn is_playable_uri(uri: &str) -> bool {
    PLAYABLE_URI.is_match(uri)
}

/// "No likes yet", "1 like", "3 likes"
pub fn like_label(count: usize) -> String {
    match count {
        0 => "No likes yet".to_string(),
        1 => "1 like".to_string(),
        n => format!("{} likes", n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playable_uri() {
        assert!(is_playable_uri("spotify:track:4uLU6hMCjMI75M1A2tKUQC"));
        assert!(is_playable_uri("spotify:episode:512ojhOuo1ktJprKbVcKyQ"));

        assert!(!is_playable_uri("spotify:album:4uLU6hMCjMI75M1A2tKUQC"));
        assert!(!is_playable_uri("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC"));
        assert!(!is_playable_uri("spotify:track:"));
    }

    #[test]
    fn test_like_label() {
        assert_eq!(like_label(0), "No likes yet");
        assert_eq!(like_label(1), "1 like");
        assert_eq!(like_label(2), "2 likes");
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
        assert_eq!(new_session_id().len(), 36);
    }
}
