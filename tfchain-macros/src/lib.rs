
use proc_macro::TokenStream;

/// Runs an async test against a fresh `crate::Harness`.
///
/// The test runs on a current-thread tokio runtime with a paused clock, so retry back-offs and
/// recurring actions advance instantly. Logs go to the test writer and honour `RUST_LOG`.
#[proc_macro_attribute]
pub fn test(args: TokenStream, item: TokenStream) -> TokenStream {
    test::test_macro(args.into(), item.into()).into()
}
