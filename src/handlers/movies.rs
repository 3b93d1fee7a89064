//! Sample movie routes.
//!
//! There is no movie storage: these handlers return placeholder records so
//! the permission gates in front of them have something to guard.

use axum::Json;
use axum::extract::Path;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use chrono::Utc;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::{CreateMovieRequest, Movie, MovieEnvelope};
use crate::validation::parse_id_param;

/// Show a movie by id.
#[instrument]
pub async fn show_movie(Path(id): Path<String>) -> AppResult<Json<MovieEnvelope>> {
    let id = parse_id_param(&id)?;

    Ok(Json(MovieEnvelope {
        movie: Movie {
            id,
            created_at: Utc::now(),
            title: "Casablanca".to_string(),
            year: Some(1942),
            runtime: 102,
            genres: vec!["drama".to_string(), "romance".to_string(), "war".to_string()],
            version: 1,
        },
    }))
}

/// Accept a new movie and echo it back.
#[instrument(skip(payload))]
pub async fn create_movie(
    payload: Result<Json<CreateMovieRequest>, JsonRejection>,
) -> AppResult<(StatusCode, HeaderMap, Json<MovieEnvelope>)> {
    let Json(input) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let movie = Movie {
        id: 1,
        created_at: Utc::now(),
        title: input.title,
        year: Some(input.year),
        runtime: input.runtime,
        genres: input.genres,
        version: 1,
    };
    debug!(title = %movie.title, "Movie accepted");

    let mut headers = HeaderMap::new();
    headers.insert(
        header::LOCATION,
        HeaderValue::from_str(&format!("/v1/movies/{}", movie.id))
            .map_err(|e| AppError::Internal(e.to_string()))?,
    );

    Ok((StatusCode::CREATED, headers, Json(MovieEnvelope { movie })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_movie_echoes_input_with_location() {
        let input = CreateMovieRequest {
            title: "Moana".to_string(),
            year: 2016,
            runtime: 107,
            genres: vec!["animation".to_string()],
        };

        let (status, headers, Json(envelope)) = create_movie(Ok(Json(input))).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers[header::LOCATION], "/v1/movies/1");
        assert_eq!(envelope.movie.title, "Moana");
        assert_eq!(envelope.movie.year, Some(2016));
    }

    #[tokio::test]
    async fn test_show_movie_rejects_bad_ids() {
        assert!(matches!(
            show_movie(Path("0".to_string())).await,
            Err(AppError::NotFound)
        ));
        let Json(envelope) = show_movie(Path("7".to_string())).await.unwrap();
        assert_eq!(envelope.movie.id, 7);
    }
}
