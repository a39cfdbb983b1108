use rand::{distributions::Alphanumeric, Rng};

pub fn random_string(size: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::random_string;

    #[test]
    fn token_shape() {
        let token = random_string(60);
        assert_eq!(token.len(), 60);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));

        assert_ne!(random_string(60), random_string(60));
    }
}
