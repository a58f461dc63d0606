use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::Barrier;

use blogers::application::identity::{
    IdentityService, SignInDecision, SignInOutcome, hydrate_session, reconcile_sign_in,
};
use blogers::application::repos::{
    AuthorInsert, AuthorsRepo, CreateAuthorParams, PostsRepo, RepoError,
};
use blogers::domain::entities::{AuthorRecord, PostRecord};
use blogers::domain::identity::{AuthenticatedIdentity, ProviderAccount, Session, SessionUser};
use blogers::domain::types::UnknownProviderPolicy;
use blogers::infra::memory::MemoryStore;

const JOINED: OffsetDateTime = datetime!(2024-03-01 12:00 UTC);

fn identity(name: &str, email: &str, image: &str) -> AuthenticatedIdentity {
    AuthenticatedIdentity {
        name: Some(name.to_string()),
        email: Some(email.to_string()),
        image: Some(image.to_string()),
    }
}

fn session_for(email: Option<&str>) -> Session {
    Session {
        user: SessionUser {
            name: Some("A".to_string()),
            email: email.map(str::to_string),
            image: None,
            ..SessionUser::default()
        },
        expires: datetime!(2030-01-01 0:00 UTC),
    }
}

fn post_by(author: &str, id: &str) -> PostRecord {
    PostRecord {
        id: id.to_string(),
        title: format!("Post {id}"),
        slug: format!("post-{id}"),
        excerpt: None,
        content: Vec::new(),
        published_at: Some(JOINED),
        author: Some(author.to_string()),
        category: None,
        views: 0,
        comments_enabled: true,
        main_image: None,
    }
}

/// Counts writes and can hold every lookup at a barrier so concurrent
/// sign-ins all miss before any of them creates.
struct ObservedAuthors {
    inner: MemoryStore,
    creates: AtomicUsize,
    patches: AtomicUsize,
    lookup_gate: Option<Arc<Barrier>>,
}

impl ObservedAuthors {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            creates: AtomicUsize::new(0),
            patches: AtomicUsize::new(0),
            lookup_gate: None,
        }
    }

    fn gated(inner: MemoryStore, gate: Arc<Barrier>) -> Self {
        Self {
            lookup_gate: Some(gate),
            ..Self::new(inner)
        }
    }
}

#[async_trait]
impl AuthorsRepo for ObservedAuthors {
    async fn find_author_by_email(&self, email: &str) -> Result<Option<AuthorRecord>, RepoError> {
        let found = self.inner.find_author_by_email(email).await?;
        if let Some(gate) = &self.lookup_gate {
            gate.wait().await;
        }
        Ok(found)
    }

    async fn find_author_by_id(&self, id: &str) -> Result<Option<AuthorRecord>, RepoError> {
        self.inner.find_author_by_id(id).await
    }

    async fn create_author_if_absent(
        &self,
        params: CreateAuthorParams,
    ) -> Result<AuthorInsert, RepoError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_author_if_absent(params).await
    }

    async fn create_author(&self, params: CreateAuthorParams) -> Result<AuthorRecord, RepoError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_author(params).await
    }

    async fn update_author_image(&self, id: &str, image: &str) -> Result<(), RepoError> {
        self.patches.fetch_add(1, Ordering::SeqCst);
        self.inner.update_author_image(id, image).await
    }

    async fn set_trusted(&self, email: &str, trusted: bool) -> Result<AuthorRecord, RepoError> {
        self.inner.set_trusted(email, trusted).await
    }
}

/// Every call fails the way an unreachable store would.
struct BrokenAuthors;

#[async_trait]
impl AuthorsRepo for BrokenAuthors {
    async fn find_author_by_email(&self, _email: &str) -> Result<Option<AuthorRecord>, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn find_author_by_id(&self, _id: &str) -> Result<Option<AuthorRecord>, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn create_author_if_absent(
        &self,
        _params: CreateAuthorParams,
    ) -> Result<AuthorInsert, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn create_author(&self, _params: CreateAuthorParams) -> Result<AuthorRecord, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn update_author_image(&self, _id: &str, _image: &str) -> Result<(), RepoError> {
        Err(RepoError::Timeout)
    }

    async fn set_trusted(&self, _email: &str, _trusted: bool) -> Result<AuthorRecord, RepoError> {
        Err(RepoError::Timeout)
    }
}

#[tokio::test]
async fn first_sign_in_creates_untrusted_author() {
    let authors = ObservedAuthors::new(MemoryStore::new());
    let outcome = reconcile_sign_in(
        &authors,
        Some(&identity("A", "a@x.com", "img1")),
        Some(&ProviderAccount::github("1001")),
        JOINED,
    )
    .await
    .expect("reconcile");

    let SignInOutcome::Created(record) = outcome else {
        panic!("expected a created author, got {outcome:?}");
    };
    assert_eq!(record.name, "A");
    assert_eq!(record.email, "a@x.com");
    assert_eq!(record.image, "img1");
    assert_eq!(record.github_id.as_deref(), Some("1001"));
    assert!(!record.trusted);
    assert_eq!(record.joined_at, JOINED);
    assert_eq!(authors.inner.author_count(), 1);
    assert_eq!(authors.creates.load(Ordering::SeqCst), 1);
    assert_eq!(authors.patches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_identity_fields_fall_back_to_defaults() {
    let store = MemoryStore::new();
    let bare = AuthenticatedIdentity::default();
    let outcome = reconcile_sign_in(&store, Some(&bare), Some(&ProviderAccount::github("7")), JOINED)
        .await
        .expect("reconcile");

    let SignInOutcome::Created(record) = outcome else {
        panic!("expected a created author, got {outcome:?}");
    };
    assert_eq!(record.name, "Unknown");
    assert_eq!(record.email, "");
    assert_eq!(record.image, "");
}

#[tokio::test]
async fn sign_ins_without_email_never_share_an_author() {
    let store = MemoryStore::new();
    let alice = AuthenticatedIdentity {
        name: Some("Alice".to_string()),
        email: None,
        image: Some("alice.png".to_string()),
    };
    let bob = AuthenticatedIdentity {
        name: Some("Bob".to_string()),
        email: Some(String::new()),
        image: Some("bob.png".to_string()),
    };

    let first = reconcile_sign_in(&store, Some(&alice), Some(&ProviderAccount::github("1")), JOINED)
        .await
        .expect("alice");
    let second = reconcile_sign_in(&store, Some(&bob), Some(&ProviderAccount::github("2")), JOINED)
        .await
        .expect("bob");

    let (SignInOutcome::Created(alice_record), SignInOutcome::Created(bob_record)) =
        (first, second)
    else {
        panic!("each email-less sign-in should create its own author");
    };
    assert_ne!(alice_record.id, bob_record.id);
    assert_eq!(bob_record.name, "Bob");
    assert_eq!(bob_record.github_id.as_deref(), Some("2"));
    assert_eq!(store.author_count(), 2);

    let stored_alice = store
        .find_author_by_id(&alice_record.id)
        .await
        .expect("lookup")
        .expect("alice stored");
    assert_eq!(stored_alice.image, "alice.png");

    let session = hydrate_session(&store, &store, session_for(Some(""))).await;
    assert_eq!(session.user.id, None);
}

#[tokio::test]
async fn repeat_sign_in_with_same_avatar_writes_nothing() {
    let authors = ObservedAuthors::new(MemoryStore::new());
    let account = ProviderAccount::github("1001");
    let who = identity("A", "a@x.com", "img1");

    reconcile_sign_in(&authors, Some(&who), Some(&account), JOINED)
        .await
        .expect("first");
    let outcome = reconcile_sign_in(&authors, Some(&who), Some(&account), OffsetDateTime::now_utc())
        .await
        .expect("second");

    assert!(matches!(outcome, SignInOutcome::Unchanged(_)));
    assert_eq!(authors.creates.load(Ordering::SeqCst), 1);
    assert_eq!(authors.patches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn changed_avatar_patches_only_the_image() {
    let store = MemoryStore::new();
    let authors = ObservedAuthors::new(store.clone());
    let account = ProviderAccount::github("1001");

    reconcile_sign_in(&authors, Some(&identity("A", "a@x.com", "img1")), Some(&account), JOINED)
        .await
        .expect("first");
    let outcome = reconcile_sign_in(
        &authors,
        Some(&identity("Renamed", "a@x.com", "img2")),
        Some(&account),
        OffsetDateTime::now_utc(),
    )
    .await
    .expect("second");

    assert!(matches!(outcome, SignInOutcome::AvatarUpdated(_)));
    assert_eq!(authors.patches.load(Ordering::SeqCst), 1);

    let stored = store.authors_with_email("a@x.com");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].image, "img2");
    assert_eq!(stored[0].name, "A");
    assert_eq!(stored[0].joined_at, JOINED);
}

#[tokio::test]
async fn empty_provider_avatar_never_clears_the_stored_one() {
    let authors = ObservedAuthors::new(MemoryStore::new());
    let account = ProviderAccount::github("1001");

    reconcile_sign_in(&authors, Some(&identity("A", "a@x.com", "img1")), Some(&account), JOINED)
        .await
        .expect("first");
    let without_avatar = AuthenticatedIdentity {
        image: None,
        ..identity("A", "a@x.com", "")
    };
    let outcome = reconcile_sign_in(&authors, Some(&without_avatar), Some(&account), JOINED)
        .await
        .expect("second");

    assert!(matches!(outcome, SignInOutcome::Unchanged(_)));
    assert_eq!(authors.patches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsupported_provider_and_missing_account_are_skipped() {
    let authors = ObservedAuthors::new(MemoryStore::new());
    let who = identity("A", "a@x.com", "img1");
    let gitlab = ProviderAccount {
        provider: "gitlab".to_string(),
        provider_account_id: "55".to_string(),
    };

    let skipped = reconcile_sign_in(&authors, Some(&who), Some(&gitlab), JOINED)
        .await
        .expect("unsupported");
    assert_eq!(skipped, SignInOutcome::Skipped);

    let skipped = reconcile_sign_in(&authors, Some(&who), None, JOINED)
        .await
        .expect("no account");
    assert_eq!(skipped, SignInOutcome::Skipped);

    let skipped = reconcile_sign_in(&authors, None, Some(&ProviderAccount::github("1")), JOINED)
        .await
        .expect("no identity");
    assert_eq!(skipped, SignInOutcome::Skipped);

    assert_eq!(authors.inner.author_count(), 0);
    assert_eq!(authors.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_first_sign_ins_create_one_author() {
    const RACERS: usize = 4;
    let store = MemoryStore::new();
    let authors = Arc::new(ObservedAuthors::gated(
        store.clone(),
        Arc::new(Barrier::new(RACERS)),
    ));

    let mut tasks = Vec::new();
    for n in 0..RACERS {
        let authors = Arc::clone(&authors);
        tasks.push(tokio::spawn(async move {
            reconcile_sign_in(
                authors.as_ref(),
                Some(&identity("B", "b@x.com", "img")),
                Some(&ProviderAccount::github(format!("200{n}"))),
                OffsetDateTime::now_utc(),
            )
            .await
        }));
    }

    let mut created = 0;
    for task in tasks {
        match task.await.expect("join").expect("reconcile") {
            SignInOutcome::Created(_) => created += 1,
            SignInOutcome::Unchanged(_) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(authors.creates.load(Ordering::SeqCst), RACERS);
    assert_eq!(store.authors_with_email("b@x.com").len(), 1);
}

#[tokio::test]
async fn hydration_copies_author_fields_and_post_count() {
    let store = MemoryStore::new();
    reconcile_sign_in(
        &store,
        Some(&identity("A", "a@x.com", "img1")),
        Some(&ProviderAccount::github("1001")),
        JOINED,
    )
    .await
    .expect("reconcile");
    store.insert_post(post_by("A", "p1"));
    store.insert_post(post_by("Someone else", "p2"));

    let session = hydrate_session(&store, &store, session_for(Some("a@x.com"))).await;
    let author = store.authors_with_email("a@x.com").remove(0);

    assert_eq!(session.user.id.as_deref(), Some(author.id.as_str()));
    assert_eq!(session.user.trusted, Some(false));
    assert_eq!(session.user.joined_at, Some(JOINED));
    assert_eq!(session.user.post_count, Some(1));
}

#[tokio::test]
async fn hydration_reflects_trust_changes_on_next_read() {
    let store = MemoryStore::new();
    reconcile_sign_in(
        &store,
        Some(&identity("A", "a@x.com", "img1")),
        Some(&ProviderAccount::github("1001")),
        JOINED,
    )
    .await
    .expect("reconcile");

    let before = hydrate_session(&store, &store, session_for(Some("a@x.com"))).await;
    assert_eq!(before.user.trusted, Some(false));

    store.set_trusted("a@x.com", true).await.expect("trust");
    let after = hydrate_session(&store, &store, session_for(Some("a@x.com"))).await;
    assert_eq!(after.user.trusted, Some(true));
    assert_eq!(after.user.post_count, Some(0));
}

#[tokio::test]
async fn hydration_leaves_unknown_or_anonymous_sessions_alone() {
    let store = MemoryStore::new();

    let unknown = session_for(Some("nobody@x.com"));
    assert_eq!(hydrate_session(&store, &store, unknown.clone()).await, unknown);

    let no_email = session_for(None);
    assert_eq!(hydrate_session(&store, &store, no_email.clone()).await, no_email);
}

#[tokio::test]
async fn hydration_swallows_store_failures() {
    let posts = MemoryStore::new();
    let session = session_for(Some("a@x.com"));

    let hydrated = hydrate_session(&BrokenAuthors, &posts, session.clone()).await;
    assert_eq!(hydrated, session);
}

fn service(authors: Arc<dyn AuthorsRepo>, policy: UnknownProviderPolicy) -> IdentityService {
    let posts: Arc<dyn PostsRepo> = Arc::new(MemoryStore::new());
    IdentityService::new(authors, posts, policy)
}

#[tokio::test]
async fn store_failure_denies_sign_in() {
    let identity_service = service(Arc::new(BrokenAuthors), UnknownProviderPolicy::Allow);
    let decision = identity_service
        .sign_in(
            Some(&identity("A", "a@x.com", "img1")),
            Some(&ProviderAccount::github("1001")),
        )
        .await;
    assert_eq!(decision, SignInDecision::Denied);
}

#[tokio::test]
async fn unknown_provider_follows_configured_policy() {
    let store = Arc::new(MemoryStore::new());
    let gitlab = ProviderAccount {
        provider: "gitlab".to_string(),
        provider_account_id: "55".to_string(),
    };
    let who = identity("A", "a@x.com", "img1");

    let allow = service(store.clone(), UnknownProviderPolicy::Allow);
    assert_eq!(
        allow.sign_in(Some(&who), Some(&gitlab)).await,
        SignInDecision::Allowed
    );

    let deny = service(store.clone(), UnknownProviderPolicy::Deny);
    assert_eq!(
        deny.sign_in(Some(&who), Some(&gitlab)).await,
        SignInDecision::Denied
    );

    assert_eq!(store.author_count(), 0);
}

#[tokio::test]
async fn sign_in_then_hydrate_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let identity_service = IdentityService::new(
        store.clone(),
        store.clone(),
        UnknownProviderPolicy::Allow,
    );

    let decision = identity_service
        .sign_in(
            Some(&identity("A", "a@x.com", "img1")),
            Some(&ProviderAccount::github("1001")),
        )
        .await;
    assert_eq!(decision, SignInDecision::Allowed);

    identity_service
        .sign_in(
            Some(&identity("A", "a@x.com", "img2")),
            Some(&ProviderAccount::github("1001")),
        )
        .await;
    store.insert_post(post_by("A", "p1"));

    let session = identity_service.hydrate(session_for(Some("a@x.com"))).await;
    assert_eq!(session.user.post_count, Some(1));

    let authors = store.authors_with_email("a@x.com");
    assert_eq!(authors.len(), 1);
    assert_eq!(authors[0].image, "img2");
}
