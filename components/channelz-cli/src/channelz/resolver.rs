//! Entity resolver
//!
//! Turns a user supplied token into a concrete entity. Numeric tokens are ids, anything
//! else is an exact, case-sensitive name. Lookups scan the whole listing and keep the
//! first match in traversal order.

// Local crates
use crate::channelz::client::{ChannelzApi, ChannelzError};
use crate::channelz::traversal::{TraversalPolicy, traverse};
use crate::models::models::{Channel, Identified, Page, Reference, Server, Socket};

// External crates
use std::fmt;
use std::time::Duration;
use tracing::instrument;

/// A parsed `describe` target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Id(i64),
    Name(String),
}

impl Token {
    pub fn parse(raw: &str) -> Self {
        match raw.parse::<i64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(raw.to_string()),
        }
    }

    pub fn matches(&self, reference: &Reference) -> bool {
        match self {
            Self::Id(id) => reference.id == *id,
            Self::Name(name) => reference.name == *name,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Scan a listing to the end and keep the first entity matching `token`.
pub async fn first_match<E, F>(
    token: &Token,
    policy: &TraversalPolicy,
    fetch: F,
) -> Result<Option<E>, ChannelzError>
where
    E: Identified,
    F: AsyncFnMut(i64, Option<Duration>) -> Result<Page<E>, ChannelzError>,
{
    let mut found: Option<E> = None;
    traverse(policy, fetch, async |entity: E| {
        if found.is_none() && token.matches(entity.reference()) {
            found = Some(entity);
        }
        Ok(())
    })
    .await?;
    Ok(found)
}

#[instrument(name = "channelz_resolver::top_channel", skip_all, fields(token = %token), level = "debug")]
pub async fn find_top_channel<C: ChannelzApi>(
    client: &C,
    policy: &TraversalPolicy,
    token: &Token,
) -> Result<Option<Channel>, ChannelzError> {
    first_match(token, policy, async |cursor, limit| {
        client.top_channels(cursor, limit).await
    })
    .await
}

#[instrument(name = "channelz_resolver::server", skip_all, fields(token = %token), level = "debug")]
pub async fn find_server<C: ChannelzApi>(
    client: &C,
    token: &Token,
) -> Result<Option<Server>, ChannelzError> {
    first_match(token, &TraversalPolicy::servers(), async |cursor, limit| {
        client.servers(cursor, limit).await
    })
    .await
}

/// Server sockets are only addressable by id; a name token never matches.
#[instrument(name = "channelz_resolver::server_socket", skip_all, fields(token = %token), level = "debug")]
pub async fn find_server_socket<C: ChannelzApi>(
    client: &C,
    token: &Token,
) -> Result<Option<Socket>, ChannelzError> {
    match token {
        Token::Id(id) => client.socket(*id).await,
        Token::Name(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channelz::fake::FakeChannelz;
    use tokio_util::sync::CancellationToken;

    fn channel(id: i64, name: &str, target: &str) -> Channel {
        Channel {
            reference: Reference::new(id, name),
            target: target.into(),
            ..Default::default()
        }
    }

    fn server(id: i64, name: &str) -> Server {
        Server {
            reference: Reference::new(id, name),
            ..Default::default()
        }
    }

    fn channel_policy() -> TraversalPolicy {
        TraversalPolicy::top_channels(Duration::from_secs(5), CancellationToken::new())
    }

    #[test]
    fn numeric_tokens_are_ids() {
        assert_eq!(Token::parse("7"), Token::Id(7));
        assert_eq!(Token::parse("-3"), Token::Id(-3));
        assert_eq!(Token::parse("7a"), Token::Name("7a".into()));
        assert_eq!(Token::parse(""), Token::Name(String::new()));
    }

    #[tokio::test]
    async fn resolves_by_id_and_by_name() {
        let fake = FakeChannelz::default()
            .with_top_channels(vec![channel(3, "a", "dns:///a"), channel(7, "x", "dns:///x")]);

        let by_id = find_top_channel(&fake, &channel_policy(), &Token::parse("7"))
            .await
            .unwrap();
        let by_name = find_top_channel(&fake, &channel_policy(), &Token::parse("x"))
            .await
            .unwrap();

        assert_eq!(by_id.as_ref().map(|c| c.reference.id), Some(7));
        assert_eq!(by_id, by_name);
    }

    #[tokio::test]
    async fn unknown_token_is_not_an_error() {
        let fake = FakeChannelz::default().with_servers(vec![server(7, "x")]);

        let found = find_server(&fake, &Token::parse("nonexistent"))
            .await
            .unwrap();

        assert!(found.is_none());
    }

    #[tokio::test]
    async fn duplicate_names_resolve_to_first_in_traversal_order() {
        let fake = FakeChannelz::default()
            .with_page_size(1)
            .with_top_channels(vec![
                channel(2, "dup", "dns:///first"),
                channel(5, "dup", "dns:///second"),
            ]);

        let found = find_top_channel(&fake, &channel_policy(), &Token::parse("dup"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.target, "dns:///first");
        // the whole listing is still scanned
        assert_eq!(fake.top_channel_cursors(), vec![0, 3]);
    }

    #[tokio::test]
    async fn server_socket_name_tokens_are_not_found() {
        let fake = FakeChannelz::default().with_socket(Socket {
            reference: Reference::new(11, "listener"),
            ..Default::default()
        });

        let by_name = find_server_socket(&fake, &Token::parse("listener"))
            .await
            .unwrap();
        let by_id = find_server_socket(&fake, &Token::parse("11")).await.unwrap();
        let missing = find_server_socket(&fake, &Token::parse("12")).await.unwrap();

        assert!(by_name.is_none());
        assert_eq!(by_id.map(|s| s.reference.id), Some(11));
        assert!(missing.is_none());
    }
}
