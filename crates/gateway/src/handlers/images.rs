//! Section image handler
//!
//! Multipart form fields: `image` (file) and/or `image_path`, plus `bookId`,
//! `inputCount`, `content_order` and `whatData`. `whatData = 2` prefers the
//! supplied path; anything else prefers the uploaded file. When only one
//! source is present it is used regardless.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    Json,
};
use serde::Serialize;

use crate::AppState;
use youbook_common::{
    auth::SessionUser,
    drafting::SectionRef,
    errors::{AppError, Result},
};

const PREFER_PATH: i32 = 2;

#[derive(Debug, Serialize)]
pub struct UpdateImageResponse {
    pub success: bool,
    pub image_path: String,
}

#[derive(Debug)]
struct UploadedImage {
    file_name: Option<String>,
    bytes: Bytes,
}

#[derive(Debug)]
enum ImageSource {
    Upload(UploadedImage),
    Path(String),
}

#[derive(Debug, Default)]
struct ImageForm {
    image: Option<UploadedImage>,
    image_path: Option<String>,
    book_id: Option<String>,
    input_count: Option<i32>,
    content_order: Option<i32>,
    what_data: Option<i32>,
}

impl ImageForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = ImageForm::default();

        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    let file_name = field.file_name().map(str::to_owned);
                    let bytes = field.bytes().await.map_err(malformed)?;
                    if !bytes.is_empty() {
                        form.image = Some(UploadedImage { file_name, bytes });
                    }
                }
                "image_path" => form.image_path = non_empty(field.text().await.map_err(malformed)?),
                "bookId" => form.book_id = non_empty(field.text().await.map_err(malformed)?),
                "inputCount" => {
                    form.input_count = parse_number(&name, field.text().await.map_err(malformed)?)?
                }
                "content_order" => {
                    form.content_order = parse_number(&name, field.text().await.map_err(malformed)?)?
                }
                "whatData" => {
                    form.what_data = parse_number(&name, field.text().await.map_err(malformed)?)?
                }
                _ => {}
            }
        }

        Ok(form)
    }

    fn section(&self) -> Result<SectionRef> {
        Ok(SectionRef {
            book_id: self.book_id.clone().ok_or_else(|| missing("bookId"))?,
            input_count: self.input_count.ok_or_else(|| missing("inputCount"))?,
            content_order: self.content_order.ok_or_else(|| missing("content_order"))?,
        })
    }

    fn source(self) -> Result<ImageSource> {
        let prefer_path = self.what_data == Some(PREFER_PATH);
        match (self.image, self.image_path) {
            (Some(image), Some(path)) => Ok(if prefer_path {
                ImageSource::Path(path)
            } else {
                ImageSource::Upload(image)
            }),
            (Some(image), None) => Ok(ImageSource::Upload(image)),
            (None, Some(path)) => Ok(ImageSource::Path(path)),
            (None, None) => Err(AppError::Validation {
                message: "an image file or image_path is required".to_string(),
                field: Some("image".to_string()),
            }),
        }
    }
}

fn malformed(err: MultipartError) -> AppError {
    AppError::InvalidFormat {
        message: format!("Malformed multipart body: {}", err.body_text()),
    }
}

fn missing(field: &str) -> AppError {
    AppError::MissingField {
        field: field.to_string(),
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_number(field: &str, value: String) -> Result<Option<i32>> {
    match non_empty(value) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| AppError::InvalidFormat {
            message: format!("{} must be an integer", field),
        }),
    }
}

async fn attach(state: &AppState, user_id: String, section: SectionRef, path: String) -> Result<()> {
    state
        .drafting
        .detached(move |drafting| async move {
            drafting
                .attach_section_image(&user_id, &section, &path)
                .await
        })
        .await
}

/// Attach an uploaded or referenced image to a finalized section
pub async fn update_image(
    State(state): State<AppState>,
    user: SessionUser,
    multipart: Multipart,
) -> Result<Json<UpdateImageResponse>> {
    let form = ImageForm::read(multipart).await?;
    let section = form.section()?;

    let image_path = match form.source()? {
        ImageSource::Path(path) => {
            attach(&state, user.user_id, section, path.clone()).await?;
            path
        }
        ImageSource::Upload(image) => {
            let stored = state
                .uploads
                .save(image.file_name.as_deref(), &image.bytes)
                .await?;
            if let Err(e) = attach(&state, user.user_id, section, stored.public_path.clone()).await
            {
                state.uploads.discard(&stored).await;
                return Err(e);
            }
            stored.public_path
        }
    };

    Ok(Json(UpdateImageResponse {
        success: true,
        image_path,
    }))
}
