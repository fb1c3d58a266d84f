// Copyright 2024. The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

/// Repeatedly evaluates `$check_expr` until it equals `$expect`, sleeping for `interval` between attempts.
/// Panics if the value does not converge within `max_attempts`.
///
/// Requires the `tokio` runtime and should be used in an async context.
///
/// ```edition2021
/// # use std::sync::{atomic::{AtomicUsize, Ordering}, Arc};
/// # use std::time::Duration;
/// # use treesync_test_utils::async_assert_eventually;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let counter = Arc::new(AtomicUsize::new(0));
/// let c = counter.clone();
/// tokio::spawn(async move {
///     c.fetch_add(1, Ordering::SeqCst);
/// });
/// async_assert_eventually!(counter.load(Ordering::SeqCst), expect = 1);
/// # }
/// ```
#[macro_export]
macro_rules! async_assert_eventually {
    ($check_expr:expr, expect = $expect:expr, max_attempts = $max_attempts:expr, interval = $interval:expr $(,)?) => {{
        let mut attempts = 0;
        let mut value = $check_expr;
        while value != $expect {
            attempts += 1;
            if attempts > $max_attempts {
                panic!(
                    "assert_eventually assertion failed. Expression did not equal {:?} after {} attempts. Last \
                     value: {:?}",
                    $expect, $max_attempts, value
                );
            }
            ::tokio::time::sleep($interval).await;
            value = $check_expr;
        }
    }};
    ($check_expr:expr, expect = $expect:expr $(,)?) => {{
        $crate::async_assert_eventually!(
            $check_expr,
            expect = $expect,
            max_attempts = 200,
            interval = ::std::time::Duration::from_millis(10)
        );
    }};
}

/// Asserts that `$check_expr` stays equal to `$expect` for the whole of `duration`, checking every 10ms.
#[macro_export]
macro_rules! async_assert_unchanged {
    ($check_expr:expr, expect = $expect:expr, duration = $duration:expr $(,)?) => {{
        let until = ::tokio::time::Instant::now() + $duration;
        loop {
            let value = $check_expr;
            assert_eq!(value, $expect, "value changed before {:?} elapsed", $duration);
            if ::tokio::time::Instant::now() >= until {
                break;
            }
            ::tokio::time::sleep(::std::time::Duration::from_millis(10)).await;
        }
    }};
}
