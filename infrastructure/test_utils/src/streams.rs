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

/// Collect `take` items from a tokio mpsc receiver or panic if they do not all arrive within `timeout`.
///
/// Requires the `tokio` runtime and should be used in an async context.
///
/// ```edition2021
/// # use std::time::Duration;
/// # use treesync_test_utils::collect_recv;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// for i in 1..10 {
///     tx.send(i).unwrap();
/// }
/// assert_eq!(collect_recv!(rx, take = 3, timeout = Duration::from_secs(1)), vec![1, 2, 3]);
/// # }
/// ```
#[macro_export]
macro_rules! collect_recv {
    ($rx:expr, take = $take:expr, timeout = $timeout:expr $(,)?) => {{
        let mut items = Vec::with_capacity($take);
        {
            let fut = async {
                while items.len() < $take {
                    match $rx.recv().await {
                        Some(item) => items.push(item),
                        None => break,
                    }
                }
            };
            if ::tokio::time::timeout($timeout, fut).await.is_err() {
                panic!("Timeout before receiver could collect {} item(s)", $take);
            }
        }
        assert_eq!(items.len(), $take, "Channel closed before {} item(s) were received", $take);
        items
    }};
}
