pub(crate) const SYSTEM_PROMPT: &str = "You normalize retail product names from a point-of-sale \
inventory. Reply with a single JSON object and nothing else. Fields: \
cleanedName (the product name without size, condition or stock codes), \
brand, model (without the brand), \
productType (one of sneaker, apparel, accessory, other), \
size (string or null), colorway (string or null), \
condition (one of new, used, deadstock, or null), \
variantLabel (the part that distinguishes this unit from its siblings, or null), \
confidence (one of high, medium, low).";

/// User turn for one raw inventory name.
pub(crate) fn classification_prompt(raw_name: &str) -> String {
    format!("Product name: {}", raw_name.trim())
}
