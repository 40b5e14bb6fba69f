use crate::reset::token::RESET_TOKEN_TTL_MINUTES;

pub fn render_password_reset(name: &str, confirm_url: &str) -> String {
    let name = escape_html(name);
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Password Reset</h2>
    <p>Hi {name},</p>
    <p>A password reset was requested for your account. Confirm it here:</p>
    <p><a href="{confirm_url}" style="display: inline-block; padding: 10px 20px; background: #22c55e; color: white; text-decoration: none; border-radius: 4px;">Reset Password</a></p>
    <p style="color: #666; font-size: 14px;">This link expires in {RESET_TOKEN_TTL_MINUTES} minutes. If you didn't request this, you can ignore it.</p>
</body>
</html>"#
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_email_contains_link_and_expiry() {
        let html = render_password_reset("Ann", "http://api.test/request/authenticate_url/1/t");
        assert!(html.contains(r#"href="http://api.test/request/authenticate_url/1/t""#));
        assert!(html.contains("expires in 10 minutes"));
        assert!(html.contains("Hi Ann,"));
    }

    #[test]
    fn user_name_is_escaped() {
        let html = render_password_reset("<b>Ann</b>", "http://x");
        assert!(html.contains("&lt;b&gt;Ann&lt;/b&gt;"));
    }
}
