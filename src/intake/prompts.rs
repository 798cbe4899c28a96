//! Texts shown to submitters and the reviewer caption.
//!
//! The conference runs in Uzbek, so every user-facing string is Uzbek.

use super::relay::Submission;
use super::validate::MAX_FILE_SIZE;

/// Used when the sender has no first name.
const DEFAULT_GREETING_NAME: &str = "hurmatli foydalanuvchi";

pub const CONTACT_BUTTON: &str = "📱 Raqamni yuborish";

pub const ASK_NAME: &str = "📝 Iltimos, ismingizni yuboring:";

pub const REJECT_EXTENSION: &str =
    "❌ Iltimos, faqat .doc, .docx yoki .pdf formatidagi fayllarni yuboring.";

pub const STORAGE_RETRY: &str =
    "⚠️ Faylni saqlashda xatolik yuz berdi. Iltimos, faylni qaytadan yuboring.";

pub const RESTART_HINT: &str = "🔄 Yangi fayl yuborish uchun /start ni bosing.";

pub const CANCELLED: &str = "❌ Jarayon bekor qilindi.";

/// Welcome message with the submission instructions.
pub fn welcome(first_name: Option<&str>) -> String {
    let name = first_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_GREETING_NAME);
    format!(
        "👋 Assalomu alaykum, {name}!\n\n\
         🎓 O'zbekiston Respublikasi Bank-moliya akademiyasining konferensiyasiga xush kelibsiz!\n\n\
         📄 Iltimos, axborot xatida belgilangan talablarga javob beruvchi tezis faylini mos bo'lgan \
         seksiya (ilmiy yo'nalish) raqam va muallif familyasini ko'rsatgan holda nomlab jo'natishingizni so'raymiz.\n\
         (masalan: 2.Abdullayev.doc).\n\n\
         🙏 Rahmat!"
    )
}

pub fn ask_phone(name: &str) -> String {
    format!("🙏 Rahmat, {name}! Iltimos, telefon raqamingizni yuboring:")
}

pub fn phone_received(phone: &str) -> String {
    format!("✅ Raqamingiz qabul qilindi: {phone}. Endi iltimos, tezis faylini yuboring.")
}

pub fn reject_size() -> String {
    format!(
        "❌ Fayl hajmi juda katta. Iltimos, {} MB dan kichik fayl yuboring.",
        MAX_FILE_SIZE / (1024 * 1024)
    )
}

pub fn file_accepted(file_name: &str) -> String {
    format!("✅ Fayl qabul qilindi: {file_name}. Rahmat! 🙏")
}

/// Caption attached to the document sent to the reviewer.
pub fn reviewer_caption(submission: &Submission) -> String {
    format!(
        "📤 Yangi fayl:\n\
         📄 Fayl nomi: {}\n\
         👤 Foydalanuvchi ismi: {}\n\
         📞 Telefon raqami: {}",
        submission.original_file_name, submission.submitter_name, submission.submitter_phone
    )
}
