// src/views.rs
//! Minimal HTML for the form pages and the apology page. Data views are
//! served as JSON by the handlers.

use warp::http::StatusCode;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>Stock Trader: {}</title></head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    )
}

fn form(action: &str, fields: &str, submit: &str) -> String {
    format!(
        "<form action=\"{}\" method=\"post\">\n{}\n<button type=\"submit\">{}</button>\n</form>",
        action, fields, submit
    )
}

fn input(name: &str, kind: &str, placeholder: &str) -> String {
    format!(
        "<input autocomplete=\"off\" name=\"{}\" type=\"{}\" placeholder=\"{}\">",
        name, kind, placeholder
    )
}

pub fn apology(message: &str, status: StatusCode) -> String {
    page(
        "Apology",
        &format!(
            "<h1>{}</h1>\n<p class=\"apology\">{}</p>",
            status.as_u16(),
            escape(message)
        ),
    )
}

pub fn login_form() -> String {
    let fields = [
        input("username", "text", "Username"),
        input("password", "password", "Password"),
    ]
    .join("\n");
    page("Log In", &form("/login", &fields, "Log In"))
}

pub fn register_form() -> String {
    let fields = [
        input("username", "text", "Username"),
        input("password", "password", "Password"),
        input("confirmation", "password", "Password (again)"),
    ]
    .join("\n");
    page("Register", &form("/register", &fields, "Register"))
}

pub fn quote_form() -> String {
    page(
        "Quote",
        &form("/quote", &input("symbol", "text", "Symbol"), "Quote"),
    )
}

pub fn buy_form() -> String {
    let fields = [
        input("symbol", "text", "Symbol"),
        input("shares", "number", "Shares"),
    ]
    .join("\n");
    page("Buy", &form("/buy", &fields, "Buy"))
}

pub fn sell_form(symbols: &[String]) -> String {
    let options: String = symbols
        .iter()
        .map(|symbol| {
            let symbol = escape(symbol);
            format!("<option value=\"{}\">{}</option>", symbol, symbol)
        })
        .collect::<Vec<_>>()
        .join("\n");
    let fields = format!(
        "<select name=\"symbol\">\n<option disabled selected value=\"\">Symbol</option>\n{}\n</select>\n{}",
        options,
        input("shares", "number", "Shares")
    );
    page("Sell", &form("/sell", &fields, "Sell"))
}
