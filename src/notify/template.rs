//! Alert message bodies.

use crate::frame::GeoCoordinate;

pub const ALERT_SUBJECT: &str = "Fire Alert Notification";
pub const ATTACHMENT_NAME: &str = "fire_alert_image.png";

const SIGNATURE: &str = "Wild Fire Warning System";

pub fn render_html(coordinate: &GeoCoordinate) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
  body {{ font-family: Arial, sans-serif; color: #222; }}
  .header {{ background: #b71c1c; color: #fff; padding: 12px 16px; font-size: 20px; }}
  .content {{ padding: 16px; }}
  .footer {{ padding: 12px 16px; color: #666; font-size: 13px; }}
</style>
</head>
<body>
<div class="header">{subject}</div>
<div class="content">
<p>A fire has been detected at the following location:</p>
<p><a href="{link}">{coordinate}</a></p>
<p>Please find the attached image for reference.</p>
</div>
<div class="footer">Regards<br>{signature}</div>
</body>
</html>
"#,
        subject = ALERT_SUBJECT,
        link = coordinate.map_link(),
        coordinate = coordinate,
        signature = SIGNATURE,
    )
}

pub fn render_plain(coordinate: &GeoCoordinate) -> String {
    format!(
        "{subject}\n\n\
         A fire has been detected at the following location:\n\
         Coordinates: {coordinate}\n\
         Map: {link}\n\n\
         Please find the attached image for reference.\n\n\
         Regards\n\
         {signature}\n",
        subject = ALERT_SUBJECT,
        coordinate = coordinate,
        link = coordinate.map_link(),
        signature = SIGNATURE,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot() -> GeoCoordinate {
        GeoCoordinate {
            latitude: 34.05,
            longitude: -118.25,
        }
    }

    #[test]
    fn html_links_to_the_coordinate() {
        let html = render_html(&spot());
        assert!(html.contains(r#"<div class="header">Fire Alert Notification</div>"#));
        assert!(html.contains(
            r#"href="https://www.google.com/maps/search/?api=1&query=34.05,-118.25""#
        ));
        assert!(html.contains("Regards<br>Wild Fire Warning System"));
    }

    #[test]
    fn plain_text_carries_coordinates() {
        let text = render_plain(&spot());
        assert!(text.starts_with("Fire Alert Notification\n"));
        assert!(text.contains("Coordinates: 34.05, -118.25\n"));
        assert!(text.contains("query=34.05,-118.25"));
    }
}
