pub mod email;
pub mod users;
pub mod votes;
