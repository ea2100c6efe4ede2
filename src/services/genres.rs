use crate::models::MediaType;

/// Genre names the client offers, in display order
pub const GENRE_NAMES: &[&str] = &[
    "Action",
    "Adventure",
    "Animation",
    "Comedy",
    "Crime",
    "Documentary",
    "Drama",
    "Family",
    "Fantasy",
    "History",
    "Horror",
    "Music",
    "Mystery",
    "Romance",
    "Sci-Fi",
    "Thriller",
    "War",
    "Western",
];

/// Maps a genre name to TMDB's movie genre id
fn movie_genre_id(name: &str) -> Option<u32> {
    let id = match name {
        "action" => 28,
        "adventure" => 12,
        "animation" | "animated" => 16,
        "comedy" => 35,
        "crime" => 80,
        "documentary" => 99,
        "drama" => 18,
        "family" => 10751,
        "fantasy" => 14,
        "history" | "historical" => 36,
        "horror" => 27,
        "music" | "musical" => 10402,
        "mystery" => 9648,
        "romance" => 10749,
        "sci-fi" | "science fiction" | "scifi" => 878,
        "thriller" => 53,
        "war" => 10752,
        "western" => 37,
        _ => return None,
    };
    Some(id)
}

/// Maps a genre name to TMDB's TV genre id
///
/// TV genres are coarser: action and adventure share an id, as do sci-fi and
/// fantasy. Horror and thriller have no TV genre and fall back to mystery.
fn tv_genre_id(name: &str) -> Option<u32> {
    let id = match name {
        "action" | "adventure" => 10759,
        "animation" | "animated" => 16,
        "comedy" => 35,
        "crime" => 80,
        "documentary" => 99,
        "drama" => 18,
        "family" => 10751,
        "sci-fi" | "science fiction" | "scifi" | "fantasy" => 10765,
        "mystery" | "horror" | "thriller" => 9648,
        "war" | "history" | "historical" => 10768,
        "western" => 37,
        "reality" => 10764,
        _ => return None,
    };
    Some(id)
}

/// Resolves genre names to deduplicated catalog ids for a media type
///
/// Unknown names are skipped; they still reach the prompts verbatim.
pub fn genre_ids(media_type: MediaType, names: &[String]) -> Vec<u32> {
    let mut ids = Vec::new();
    for name in names {
        let key = name.trim().to_lowercase();
        let id = match media_type {
            MediaType::Movie => movie_genre_id(&key),
            MediaType::Tv => tv_genre_id(&key),
        };
        match id {
            Some(id) if !ids.contains(&id) => ids.push(id),
            Some(_) => {}
            None => tracing::debug!(genre = %name, media_type = ?media_type, "Unmapped genre"),
        }
    }
    ids
}

/// Genre names that map to a catalog id for the media type
pub fn supported_genres(media_type: MediaType) -> Vec<&'static str> {
    GENRE_NAMES
        .iter()
        .copied()
        .filter(|name| {
            let key = name.to_lowercase();
            match media_type {
                MediaType::Movie => movie_genre_id(&key).is_some(),
                MediaType::Tv => tv_genre_id(&key).is_some(),
            }
        })
        .collect()
}
