use crate::domain::driver::page_driver::{ElementRef, PageDriver};

const CONSENT_SELECTORS: [&str; 4] =
    ["#onetrust-accept-btn-handler", "button[data-testid='cookie-accept']", ".cookie-consent-accept", "#accept-cookies"];

/// Dismisses a cookie-consent banner when one covers the calendar.
/// Strictly best effort; a missing banner or a failed click never fails
/// the booking.
#[derive(Debug, Clone, Default)]
pub struct CookieConsentHandler;

impl CookieConsentHandler {
    pub fn new() -> CookieConsentHandler {
        CookieConsentHandler
    }

    pub async fn dismiss_if_present(&self, driver: &dyn PageDriver) -> bool {
        for selector in CONSENT_SELECTORS {
            match driver.locate_all(selector).await {
                Ok(handles) if !handles.is_empty() => {
                    if let Err(error) = driver.click(ElementRef::Handle(handles[0])).await {
                        log::debug!("Consent banner click on '{}' failed: {}", selector, error);
                        continue;
                    }
                    log::info!("Dismissed cookie-consent banner via '{}'.", selector);
                    return true;
                }
                Ok(_) => {}
                Err(error) => log::debug!("Consent lookup '{}' failed: {}", selector, error),
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::driver::driver_mock::MockPageDriver;

    #[tokio::test]
    async fn test_clicks_the_banner_when_present() {
        let driver = MockPageDriver::new();
        driver.register_element("button", &[("id", "onetrust-accept-btn-handler")]);

        assert!(CookieConsentHandler::new().dismiss_if_present(&driver).await);
        assert_eq!(driver.clicks().len(), 1);
    }

    #[tokio::test]
    async fn test_absent_banner_is_a_no_op() {
        let driver = MockPageDriver::new();
        assert!(!CookieConsentHandler::new().dismiss_if_present(&driver).await);
        assert!(driver.clicks().is_empty());
    }
}
