use futures::future::BoxFuture;
use std::sync::Arc;

use crate::models::message::{AssistantMessage, Message};

type BlockingHook<A, C> = Box<dyn Fn(&A, &C) + Send + Sync>;
type AsyncHook<T, C> = Box<dyn Fn(T, Arc<C>) -> BoxFuture<'static, ()> + Send + Sync>;

/// An observer called with a borrowed value and the conversation context.
///
/// Async observers receive an owned copy, so their futures are not tied to the
/// conversation's borrows.
pub(crate) enum Hook<A: ?Sized + ToOwned, C> {
    Blocking(BlockingHook<A, C>),
    Async(AsyncHook<A::Owned, C>),
}

impl<A: ?Sized + ToOwned, C> Hook<A, C> {
    pub(crate) async fn invoke(&self, value: &A, context: &Arc<C>) {
        match self {
            Hook::Blocking(hook) => hook(value, context.as_ref()),
            Hook::Async(hook) => hook(value.to_owned(), context.clone()).await,
        }
    }
}

/// Every observer registered on an agent, each list in registration order.
pub(crate) struct Hooks<C, O: Clone> {
    /// Called with the full prompt before each provider call
    pub prompt: Vec<Hook<[Message], C>>,
    /// Called with each raw assistant turn
    pub output: Vec<Hook<AssistantMessage, C>>,
    /// Called with each produced message before it reaches the caller
    pub message: Vec<Hook<O, C>>,
}

impl<C, O: Clone> Default for Hooks<C, O> {
    fn default() -> Self {
        Self {
            prompt: Vec::new(),
            output: Vec::new(),
            message: Vec::new(),
        }
    }
}

pub(crate) async fn run_all<A: ?Sized + ToOwned, C>(
    hooks: &[Hook<A, C>],
    value: &A,
    context: &Arc<C>,
) {
    for hook in hooks {
        hook.invoke(value, context).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        let second = seen.clone();
        let hooks: Vec<Hook<String, ()>> = vec![
            Hook::Blocking(Box::new(move |value: &String, _: &()| {
                first.lock().unwrap().push(format!("blocking {value}"));
            })),
            Hook::Async(Box::new(move |value: String, _: Arc<()>| {
                let second = second.clone();
                async move {
                    tokio::task::yield_now().await;
                    second.lock().unwrap().push(format!("async {value}"));
                }
                .boxed()
            })),
        ];

        run_all(&hooks, &"hello".to_string(), &Arc::new(())).await;
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["blocking hello".to_string(), "async hello".to_string()]
        );
    }

    #[tokio::test]
    async fn test_slice_hooks_receive_owned_copy() {
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let hooks: Vec<Hook<[Message], ()>> =
            vec![Hook::Async(Box::new(move |prompt: Vec<Message>, _: Arc<()>| {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += prompt.len();
                }
                .boxed()
            }))];

        let prompt = vec![Message::system("sys"), Message::user("hi")];
        run_all(&hooks, prompt.as_slice(), &Arc::new(())).await;
        assert_eq!(*count.lock().unwrap(), 2);
    }
}
