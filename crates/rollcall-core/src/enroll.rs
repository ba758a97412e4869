//! Enrollment validation — identity fields, email-domain policy, and the
//! 5-angle capture set. The atomic commit lives in `rollcall-store`; this
//! module is everything that can be checked without touching storage.

use crate::types::Angle;
use image::ImageFormat;
use std::collections::HashMap;
use thiserror::Error;

/// A complete enrollment submission: identity fields plus one image part
/// per canonical angle.
#[derive(Debug, Clone)]
pub struct EnrollmentRequest {
    pub full_name: String,
    pub student_id: String,
    pub school_email: String,
    pub images: HashMap<Angle, Vec<u8>>,
}

/// Rejections that occur before anything is persisted.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("email domain not allowed: {0}")]
    DomainNotAllowed(String),
    #[error("missing capture image for angle: {0}")]
    MissingAngle(Angle),
    #[error("capture for angle {0} is not a valid JPEG or PNG image")]
    BadCapture(Angle),
}

/// Email-domain allow-list applied at enrollment time only.
/// The default is "allow all"; a configured list matches the domain part
/// of the address case-insensitively, including subdomains.
#[derive(Debug, Clone, Default)]
pub struct EmailPolicy {
    allowed_domains: Option<Vec<String>>,
}

impl EmailPolicy {
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn restrict_to(domains: Vec<String>) -> Self {
        Self {
            allowed_domains: Some(domains),
        }
    }

    pub fn allows(&self, email: &str) -> bool {
        let Some(domains) = &self.allowed_domains else {
            return true;
        };
        let Some((_, domain)) = email.rsplit_once('@') else {
            return false;
        };
        let domain = domain.to_lowercase();
        domains.iter().any(|allowed| {
            let allowed = allowed.trim().to_lowercase();
            domain == allowed || domain.ends_with(&format!(".{allowed}"))
        })
    }
}

/// Check the identity fields: all present and non-empty, email domain
/// admitted by the policy. Field order matches the submission form, so the
/// first missing field reported is the first one the user skipped.
pub fn validate_identity(
    request: &EnrollmentRequest,
    policy: &EmailPolicy,
) -> Result<(), ValidationError> {
    for (value, field) in [
        (&request.full_name, "full_name"),
        (&request.student_id, "student_id"),
        (&request.school_email, "school_email"),
    ] {
        if value.trim().is_empty() {
            return Err(ValidationError::MissingField(field));
        }
    }
    if !policy.allows(&request.school_email) {
        return Err(ValidationError::DomainNotAllowed(
            request.school_email.clone(),
        ));
    }
    // A student id whose every character is stripped by sanitization has no
    // usable identity and no storage location.
    if sanitize_student_id(&request.student_id).is_empty() {
        return Err(ValidationError::MissingField("student_id"));
    }
    Ok(())
}

/// A capture part that sniffed and decoded as a supported raster image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidCapture {
    pub angle: Angle,
    /// File extension for the persisted image ("jpg" or "png").
    pub extension: &'static str,
}

/// Check that all five canonical angles are present and each part is a
/// well-formed JPEG or PNG. Angles are checked in canonical order, so the
/// first missing one is reported.
pub fn validate_captures(
    images: &HashMap<Angle, Vec<u8>>,
) -> Result<Vec<ValidCapture>, ValidationError> {
    let mut captures = Vec::with_capacity(Angle::ALL.len());
    for angle in Angle::ALL {
        let bytes = images
            .get(&angle)
            .filter(|bytes| !bytes.is_empty())
            .ok_or(ValidationError::MissingAngle(angle))?;

        let format =
            image::guess_format(bytes).map_err(|_| ValidationError::BadCapture(angle))?;
        let extension = match format {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            _ => return Err(ValidationError::BadCapture(angle)),
        };
        // Magic bytes are not enough: the body must decode as a raster image.
        image::load_from_memory_with_format(bytes, format)
            .map_err(|_| ValidationError::BadCapture(angle))?;

        captures.push(ValidCapture { angle, extension });
    }
    Ok(captures)
}

/// Reduce a student id to a safe path segment: every character outside
/// `[A-Za-z0-9_-]` is stripped.
pub fn sanitize_student_id(id: &str) -> String {
    id.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([120, 80, 40]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([40, 80, 120]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Jpeg)
            .unwrap();
        out.into_inner()
    }

    fn full_request() -> EnrollmentRequest {
        EnrollmentRequest {
            full_name: "Tran Trung Ran".into(),
            student_id: "23BI10017".into(),
            school_email: "RanTT.23BI10017@usth.edu.vn".into(),
            images: Angle::ALL.iter().map(|a| (*a, png_bytes())).collect(),
        }
    }

    #[test]
    fn test_identity_requires_all_fields() {
        let policy = EmailPolicy::allow_all();
        for field in ["full_name", "student_id", "school_email"] {
            let mut request = full_request();
            match field {
                "full_name" => request.full_name = "  ".into(),
                "student_id" => request.student_id.clear(),
                _ => request.school_email.clear(),
            }
            match validate_identity(&request, &policy) {
                Err(ValidationError::MissingField(reported)) => assert_eq!(reported, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_identity_accepts_valid_request() {
        assert!(validate_identity(&full_request(), &EmailPolicy::allow_all()).is_ok());
    }

    #[test]
    fn test_email_policy_default_allows_anything() {
        let policy = EmailPolicy::allow_all();
        assert!(policy.allows("anyone@anywhere.example"));
        assert!(policy.allows("not-an-email"));
    }

    #[test]
    fn test_email_policy_restricts_domain() {
        let policy = EmailPolicy::restrict_to(vec!["usth.edu.vn".into()]);
        assert!(policy.allows("a@usth.edu.vn"));
        assert!(policy.allows("a@USTH.EDU.VN"));
        assert!(policy.allows("a@mail.usth.edu.vn"));
        assert!(!policy.allows("a@gmail.com"));
        assert!(!policy.allows("a@notusth.edu.vn"));
        assert!(!policy.allows("no-at-sign"));
    }

    #[test]
    fn test_disallowed_domain_is_rejected() {
        let mut request = full_request();
        request.school_email = "someone@gmail.com".into();
        let policy = EmailPolicy::restrict_to(vec!["usth.edu.vn".into()]);
        assert!(matches!(
            validate_identity(&request, &policy),
            Err(ValidationError::DomainNotAllowed(_))
        ));
    }

    #[test]
    fn test_unsanitizable_id_is_rejected() {
        let mut request = full_request();
        request.student_id = "../..".into();
        assert!(matches!(
            validate_identity(&request, &EmailPolicy::allow_all()),
            Err(ValidationError::MissingField("student_id"))
        ));
    }

    #[test]
    fn test_captures_require_all_angles() {
        let mut images = full_request().images;
        images.remove(&Angle::Up);
        assert!(matches!(
            validate_captures(&images),
            Err(ValidationError::MissingAngle(Angle::Up))
        ));
    }

    #[test]
    fn test_empty_part_counts_as_missing() {
        let mut images = full_request().images;
        images.insert(Angle::Left, Vec::new());
        assert!(matches!(
            validate_captures(&images),
            Err(ValidationError::MissingAngle(Angle::Left))
        ));
    }

    #[test]
    fn test_captures_accept_jpeg_and_png() {
        let mut images = full_request().images;
        images.insert(Angle::Front, jpeg_bytes());
        let captures = validate_captures(&images).unwrap();
        assert_eq!(captures.len(), 5);
        let front = captures.iter().find(|c| c.angle == Angle::Front).unwrap();
        assert_eq!(front.extension, "jpg");
        let left = captures.iter().find(|c| c.angle == Angle::Left).unwrap();
        assert_eq!(left.extension, "png");
    }

    #[test]
    fn test_captures_reject_non_image_bytes() {
        let mut images = full_request().images;
        images.insert(Angle::Down, b"definitely not an image".to_vec());
        assert!(matches!(
            validate_captures(&images),
            Err(ValidationError::BadCapture(Angle::Down))
        ));
    }

    #[test]
    fn test_captures_reject_truncated_image() {
        let mut images = full_request().images;
        let mut truncated = png_bytes();
        truncated.truncate(truncated.len() / 2);
        images.insert(Angle::Right, truncated);
        assert!(matches!(
            validate_captures(&images),
            Err(ValidationError::BadCapture(Angle::Right))
        ));
    }

    #[test]
    fn test_sanitize_student_id() {
        assert_eq!(sanitize_student_id("23BI10017"), "23BI10017");
        assert_eq!(sanitize_student_id("a/../b c!"), "abc");
        assert_eq!(sanitize_student_id("A_b-9"), "A_b-9");
        assert_eq!(sanitize_student_id("../.."), "");
    }
}
