//! HTML pages served by the provisioning portal.
//!
//! Network names come from the air and are escaped before they reach
//! markup.

use std::fmt::Write;

/// Escape text for use in HTML content and double-quoted attributes.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Network names to offer: sorted, unique, hidden networks left out.
pub fn selectable_ssids<'a>(ssids: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut names: Vec<&str> = ssids.into_iter().filter(|s| !s.is_empty()).collect();
    names.sort_unstable();
    names.dedup();
    names
}

/// Network selection form posting to `configure`.
pub fn selection_form(ssids: &[&str], credentials_file: &str) -> String {
    let mut page = String::from(
        r#"<html>
    <h1 style="color: #5e9ca0; text-align: center;">
        <span style="color: #ff0000;">Wi-Fi Client Setup</span>
    </h1>
    <form action="configure" method="post">
        <table style="margin-left: auto; margin-right: auto;">
            <tbody>
"#,
    );

    for ssid in ssids {
        let ssid = html_escape(ssid);
        // Writing into a String cannot fail.
        let _ = write!(
            page,
            r#"                <tr>
                    <td colspan="2">
                        <input type="radio" name="ssid" value="{0}" />{0}
                    </td>
                </tr>
"#,
            ssid
        );
    }

    let _ = write!(
        page,
        r#"                <tr>
                    <td>Password:</td>
                    <td><input name="password" type="password" /></td>
                </tr>
            </tbody>
        </table>
        <p style="text-align: center;">
            <input type="submit" value="Submit" />
        </p>
    </form>
    <hr />
    <h5>
        <span style="color: #ff0000;">
            Your ssid and password will be saved into the "{}" file on this
            device for future use. Be careful about security!
        </span>
    </h5>
</html>
"#,
        html_escape(credentials_file)
    );

    page
}

/// Page confirming the device joined `ssid`.
pub fn connected_page(ssid: &str) -> String {
    format!(
        r#"<html>
    <center>
        <br><br>
        <h1 style="color: #5e9ca0; text-align: center;">
            <span style="color: #ff0000;">
                Device successfully connected to WiFi network {}.
            </span>
        </h1>
        <br><br>
    </center>
</html>
"#,
        html_escape(ssid)
    )
}

/// Page reporting that joining `ssid` failed, with a way back to the form.
pub fn connect_failed_page(ssid: &str) -> String {
    format!(
        r#"<html>
    <center>
        <h1 style="color: #5e9ca0; text-align: center;">
            <span style="color: #ff0000;">
                Device could not connect to WiFi network {}.
            </span>
        </h1>
        <br><br>
        <form>
            <input type="button" value="Go back!" onclick="history.back()"></input>
        </form>
    </center>
</html>
"#,
        html_escape(ssid)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<b>"Tom & Jerry's"</b>"#),
            "&lt;b&gt;&quot;Tom &amp; Jerry&#39;s&quot;&lt;/b&gt;"
        );
    }

    #[test]
    fn test_selectable_ssids() {
        let names = selectable_ssids(["zeta", "", "alpha", "zeta", "mid"]);
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_selection_form_lists_networks() {
        let page = selection_form(&["guest", "home <5G>"], "wifi.dat");

        assert!(page.contains(r#"value="guest" />guest"#));
        assert!(page.contains(r#"value="home &lt;5G&gt;" />home &lt;5G&gt;"#));
        assert!(page.contains(r#"<form action="configure" method="post">"#));
        assert!(page.contains(r#"name="password" type="password""#));
        assert!(page.contains("\"wifi.dat\" file"));
    }

    #[test]
    fn test_result_pages_name_the_network() {
        assert!(connected_page("home").contains("connected to WiFi network home."));
        let failed = connect_failed_page("a&b");
        assert!(failed.contains("could not connect to WiFi network a&amp;b."));
        assert!(failed.contains("history.back()"));
    }
}
