use autolot::cli::load_session_secret;

// Keep this the only test in this binary: it mutates the process environment.
#[test]
fn test_session_secret_read_once_and_removed_from_env() {
    let secret = "s".repeat(40);
    // SAFETY: No other test runs in this process and no runtime is started.
    unsafe { std::env::set_var("SESSION_SECRET", &secret) };

    assert_eq!(load_session_secret(None), Some(secret));
    assert!(std::env::var("SESSION_SECRET").is_err());

    // Nothing left to read and no file configured
    assert_eq!(load_session_secret(None), None);
}
