/// Development transport: nothing leaves the process, the message is
/// logged so reset links can be copied from the console. Swapping in a
/// real delivery backend only touches this function.
pub fn send_email(to: &str, subject: &str, html: &str) {
    log::info!("outgoing email to {}: {}\n{}", to, subject, html);
}
