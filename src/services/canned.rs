//! Placeholder rendering for canned responses.
//!
//! Supported placeholders (whitespace inside the braces is ignored):
//! `{{ticket.number}}`, `{{ticket.subject}}`, `{{contact.name}}`,
//! `{{contact.email}}`, `{{agent.name}}`. Unknown placeholders and
//! unterminated braces are copied through unchanged.

/// Values available to a template.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    pub ticket_number: String,
    pub ticket_subject: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub agent_name: String,
}

impl RenderContext {
    fn lookup(&self, key: &str) -> Option<&str> {
        match key {
            "ticket.number" => Some(&self.ticket_number),
            "ticket.subject" => Some(&self.ticket_subject),
            // A ticket without a contact renders contact fields as empty.
            "contact.name" => Some(self.contact_name.as_deref().unwrap_or("")),
            "contact.email" => Some(self.contact_email.as_deref().unwrap_or("")),
            "agent.name" => Some(&self.agent_name),
            _ => None,
        }
    }
}

pub fn render(template: &str, context: &RenderContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = after_open[..end].trim();
        match context.lookup(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RenderContext {
        RenderContext {
            ticket_number: "TKT-000042".to_string(),
            ticket_subject: "Refund request".to_string(),
            contact_name: Some("Jane".to_string()),
            contact_email: Some("jane@example.com".to_string()),
            agent_name: "Sam".to_string(),
        }
    }

    #[test]
    fn substitutes_known_placeholders() {
        let rendered = render(
            "Hi {{contact.name}}, about {{ ticket.number }} ({{ticket.subject}}) -- {{agent.name}}",
            &context(),
        );
        assert_eq!(
            rendered,
            "Hi Jane, about TKT-000042 (Refund request) -- Sam"
        );
    }

    #[test]
    fn unknown_placeholders_are_left_intact() {
        assert_eq!(
            render("Order {{order.id}} for {{contact.email}}", &context()),
            "Order {{order.id}} for jane@example.com"
        );
    }

    #[test]
    fn unterminated_braces_are_copied() {
        assert_eq!(render("Hi {{contact.name", &context()), "Hi {{contact.name");
    }

    #[test]
    fn missing_contact_renders_empty() {
        let mut ctx = context();
        ctx.contact_name = None;
        assert_eq!(render("Hi {{contact.name}}!", &ctx), "Hi !");
    }

    #[test]
    fn non_ascii_text_survives() {
        assert_eq!(
            render("Olá {{contact.name}}, obrigado", &context()),
            "Olá Jane, obrigado"
        );
    }
}
