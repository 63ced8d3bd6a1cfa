use rand::seq::SliceRandom;

/// Word list for session ids. Short, unambiguous, easy to read aloud.
const WORDS: &[&str] = &[
    "amber", "aspen", "basil", "birch", "brook", "cedar", "cloud", "coral",
    "crane", "delta", "dusk", "ember", "fern", "flint", "frost", "gale",
    "glade", "grove", "harbor", "hazel", "heron", "iris", "ivory", "juniper",
    "kestrel", "lagoon", "larch", "linden", "lotus", "maple", "marsh", "mesa",
    "mist", "moss", "north", "oak", "onyx", "opal", "otter", "pine",
    "plume", "quartz", "raven", "reef", "ridge", "river", "robin", "sable",
    "sage", "slate", "spruce", "stone", "summit", "thistle", "tide", "vale",
    "willow", "wren",
];

/// Generate a session id: three random words joined by hyphens.
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let mut pick = || *WORDS.choose(&mut rng).unwrap_or(&"otter");
    let (a, b, c) = (pick(), pick(), pick());
    format!("{a}-{b}-{c}")
}

/// Generate a session id not matched by `exists_fn`. Retries are bounded;
/// once the word space looks crowded a random numeric suffix is appended
/// instead of looping forever.
pub fn generate_unique_session_id<F>(exists_fn: F) -> String
where
    F: Fn(&str) -> bool,
{
    const MAX_ATTEMPTS: u32 = 100;

    let mut attempts = 0;
    loop {
        let id = generate_session_id();
        if !exists_fn(&id) {
            return id;
        }
        attempts += 1;
        if attempts >= MAX_ATTEMPTS {
            let suffix: u32 = rand::random::<u32>() % 10_000;
            return format!("{id}-{suffix}");
        }
    }
}
